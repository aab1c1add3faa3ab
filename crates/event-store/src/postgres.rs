use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Version,
    store::{AppendBatch, AppendOptions, EventStore},
};

/// Name of the unique `(aggregate_id, version)` index in the `events` table.
const STREAM_VERSION_CONSTRAINT: &str = "unique_aggregate_version";

const STREAM_QUERY: &str = "SELECT id, event_type, aggregate_id, aggregate_type, version, \
     timestamp, payload, metadata FROM events WHERE aggregate_id = $1 ORDER BY version";

const TYPE_QUERY: &str = "SELECT id, event_type, aggregate_id, aggregate_type, version, \
     timestamp, payload, metadata FROM events WHERE event_type = $1 ORDER BY position";

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    event_type: String,
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    timestamp: DateTime<Utc>,
    payload: serde_json::Value,
    metadata: Json<HashMap<String, serde_json::Value>>,
}

impl From<EventRow> for EventEnvelope {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: EventId::from_uuid(row.id),
            event_type: row.event_type,
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            version: Version::new(row.version),
            timestamp: row.timestamp,
            payload: row.payload,
            metadata: row.metadata.0,
        }
    }
}

/// Event store over the `events` table created by `migrations/`.
///
/// `position` (a bigserial) gives the global append order used by
/// [`EventStore::get_events_by_type`].
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("event store schema is up to date");
        Ok(())
    }
}

async fn stream_head(conn: &mut PgConnection, aggregate_id: AggregateId) -> Result<Version> {
    let head: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
            .bind(aggregate_id.as_uuid())
            .fetch_one(conn)
            .await?;
    Ok(head.map_or_else(Version::initial, Version::new))
}

async fn insert(conn: &mut PgConnection, event: &EventEnvelope) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO events \
         (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(event.event_id.as_uuid())
    .bind(&event.event_type)
    .bind(event.aggregate_id.as_uuid())
    .bind(&event.aggregate_type)
    .bind(event.version.as_i64())
    .bind(event.timestamp)
    .bind(&event.payload)
    .bind(Json(&event.metadata))
    .execute(conn)
    .await?;
    Ok(())
}

fn violates_stream_version(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.constraint() == Some(STREAM_VERSION_CONSTRAINT)
    )
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip_all, fields(count = events.len()))]
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let batch = AppendBatch::inspect(&events)?;
        let mut tx = self.pool.begin().await?;

        if options.expected_version.is_some() {
            let head = stream_head(&mut tx, batch.aggregate_id).await?;
            options.check_head(batch.aggregate_id, head)?;
        }

        for event in &events {
            if let Err(err) = insert(&mut tx, event).await {
                if violates_stream_version(&err) {
                    let expected = options.expected_version.unwrap_or_else(Version::initial);
                    return Err(EventStoreError::conflict(
                        batch.aggregate_id,
                        expected,
                        event.version,
                    ));
                }
                return Err(err.into());
            }
        }

        tx.commit().await?;
        metrics::counter!("events_appended_total").increment(batch.len());
        tracing::debug!(aggregate_id = %batch.aggregate_id, head = %batch.last, "appended");
        Ok(batch.last)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let rows: Vec<EventRow> = sqlx::query_as(STREAM_QUERY)
            .bind(aggregate_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let rows: Vec<EventRow> = sqlx::query_as(TYPE_QUERY)
            .bind(event_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let mut conn = self.pool.acquire().await?;
        let head = stream_head(&mut conn, aggregate_id).await?;
        Ok((head != Version::initial()).then_some(head))
    }
}
