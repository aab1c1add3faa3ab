//! Postgres-backed store tests. They start a shared container, so they need
//! Docker:
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration -- --ignored
//! ```

use event_store::{
    AggregateId, AppendOptions, EventEnvelope, EventStore, EventStoreExt, PostgresEventStore,
    Version,
};
use sqlx::postgres::PgPoolOptions;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct Database {
    _container: ContainerAsync<Postgres>,
    url: String,
}

static DATABASE: OnceCell<Database> = OnceCell::const_new();

async fn database_url() -> &'static str {
    let database = DATABASE
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let url = format!(
                "postgres://postgres:postgres@{}:{}/postgres",
                container.get_host().await.unwrap(),
                container.get_host_port_ipv4(5432).await.unwrap()
            );
            Database {
                _container: container,
                url,
            }
        })
        .await;
    &database.url
}

/// Every test writes to fresh stream ids, so the table is never truncated.
async fn store() -> PostgresEventStore {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url().await)
        .await
        .unwrap();
    let store = PostgresEventStore::new(pool);
    store.run_migrations().await.unwrap();
    store
}

fn step_event(step: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(step)
        .aggregate_type("SagaStep")
        .event_type(event_type)
        .version(Version::new(version))
        .payload_raw(serde_json::json!({"step_name": "create_user"}))
        .metadata("command", serde_json::json!("create_saga_step"))
        .build()
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn stream_round_trips_through_postgres() {
    let store = store().await;
    let step = AggregateId::new();

    let head = store
        .append(
            vec![step_event(step, 1, "StepCreated"), step_event(step, 2, "StepStarted")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    assert_eq!(head, Version::new(2));

    let events = store.get_events_for_aggregate(step).await.unwrap();
    let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, ["StepCreated", "StepStarted"]);
    assert_eq!(events[0].metadata["command"], "create_saga_step");
    assert_eq!(events[1].payload["step_name"], "create_user");

    assert_eq!(store.get_aggregate_version(step).await.unwrap(), Some(head));
    assert!(store.aggregate_exists(step).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn second_writer_of_same_version_conflicts() {
    let store = store().await;
    let step = AggregateId::new();
    store
        .append(vec![step_event(step, 1, "StepCreated")], AppendOptions::expect_new())
        .await
        .unwrap();

    let stale = store
        .append(vec![step_event(step, 1, "StepCreated")], AppendOptions::expect_new())
        .await
        .unwrap_err();
    assert!(stale.is_conflict());

    let unchecked = store
        .append(vec![step_event(step, 1, "StepCreated")], AppendOptions::new())
        .await
        .unwrap_err();
    assert!(unchecked.is_conflict());

    assert_eq!(store.get_events_for_aggregate(step).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn type_query_follows_global_position() {
    let store = store().await;
    let event_type = format!("Probe{}", AggregateId::new().as_uuid().simple());
    let (first, second) = (AggregateId::new(), AggregateId::new());

    for step in [first, second] {
        store
            .append(vec![step_event(step, 1, &event_type)], AppendOptions::new())
            .await
            .unwrap();
    }

    let ids: Vec<_> = store
        .get_events_by_type(&event_type)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.aggregate_id)
        .collect();
    assert_eq!(ids, [first, second]);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn unknown_stream_reads_empty() {
    let store = store().await;
    let step = AggregateId::new();

    assert_eq!(store.get_aggregate_version(step).await.unwrap(), None);
    assert!(store.get_events_for_aggregate(step).await.unwrap().is_empty());
}
