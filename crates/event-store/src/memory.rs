use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{AppendBatch, AppendOptions, EventStore},
};

/// Every event in append order plus, per stream, the log positions that
/// belong to it.
#[derive(Default)]
struct Log {
    events: Vec<EventEnvelope>,
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Log {
    fn stream(&self, aggregate_id: &AggregateId) -> impl Iterator<Item = &EventEnvelope> {
        self.streams
            .get(aggregate_id)
            .into_iter()
            .flatten()
            .map(move |&position| &self.events[position])
    }

    fn head(&self, aggregate_id: &AggregateId) -> Option<Version> {
        self.stream(aggregate_id).last().map(|event| event.version)
    }
}

/// Event store held in process memory.
///
/// Used by tests and by `saga-runner` when no database is configured.
/// Appends obey the same rules as the Postgres store, including the
/// unique `(aggregate_id, version)` constraint.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    pub async fn stream_count(&self) -> usize {
        self.log.read().await.streams.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let batch = AppendBatch::inspect(&events)?;
        let mut log = self.log.write().await;

        let head = log.head(&batch.aggregate_id).unwrap_or_else(Version::initial);
        options.check_head(batch.aggregate_id, head)?;
        if batch.first != head.next() {
            let expected = options.expected_version.unwrap_or(head);
            return Err(EventStoreError::conflict(batch.aggregate_id, expected, head));
        }

        let start = log.events.len();
        log.events.extend(events);
        let end = log.events.len();
        log.streams
            .entry(batch.aggregate_id)
            .or_default()
            .extend(start..end);

        metrics::counter!("events_appended_total").increment(batch.len());
        Ok(batch.last)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        Ok(self.log.read().await.stream(&aggregate_id).cloned().collect())
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .events
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.log.read().await.head(&aggregate_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStoreExt;

    fn saga_event(saga: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(saga)
            .aggregate_type("SagaInstance")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"saga_id": saga}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn first_append_creates_the_stream() {
        let store = InMemoryEventStore::new();
        let saga = AggregateId::new();

        let head = store
            .append(vec![saga_event(saga, 1, "SagaCreated")], AppendOptions::expect_new())
            .await
            .unwrap();

        assert_eq!(head, Version::first());
        assert!(store.aggregate_exists(saga).await.unwrap());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn batch_append_returns_new_head() {
        let store = InMemoryEventStore::new();
        let saga = AggregateId::new();

        let head = store
            .append(
                vec![
                    saga_event(saga, 1, "SagaCreated"),
                    saga_event(saga, 2, "SagaStarted"),
                    saga_event(saga, 3, "StepAttached"),
                ],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        assert_eq!(head, Version::new(3));
        let types: Vec<_> = store
            .get_events_for_aggregate(saga)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(types, ["SagaCreated", "SagaStarted", "StepAttached"]);
    }

    #[tokio::test]
    async fn writer_with_stale_head_is_refused() {
        let store = InMemoryEventStore::new();
        let saga = AggregateId::new();
        store
            .append(vec![saga_event(saga, 1, "SagaCreated")], AppendOptions::expect_new())
            .await
            .unwrap();

        let err = store
            .append(
                vec![saga_event(saga, 2, "SagaStarted")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn reused_version_is_refused_without_expectation() {
        let store = InMemoryEventStore::new();
        let saga = AggregateId::new();
        store
            .append(vec![saga_event(saga, 1, "SagaCreated")], AppendOptions::new())
            .await
            .unwrap();

        let err = store
            .append(vec![saga_event(saga, 1, "SagaCreated")], AppendOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EventStoreError::ConcurrencyConflict { actual, .. } if actual == Version::first()
        ));
    }

    #[tokio::test]
    async fn type_query_spans_streams_in_append_order() {
        let store = InMemoryEventStore::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());

        for (saga, version, event_type) in [
            (a, 1, "SagaCreated"),
            (b, 1, "SagaCreated"),
            (a, 2, "SagaStarted"),
        ] {
            store
                .append(vec![saga_event(saga, version, event_type)], AppendOptions::new())
                .await
                .unwrap();
        }

        let created: Vec<_> = store
            .get_events_by_type("SagaCreated")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.aggregate_id)
            .collect();
        assert_eq!(created, [a, b]);
        assert_eq!(store.stream_count().await, 2);
    }

    #[tokio::test]
    async fn missing_stream_is_empty() {
        let store = InMemoryEventStore::new();
        let saga = AggregateId::new();

        assert_eq!(store.get_aggregate_version(saga).await.unwrap(), None);
        assert!(store.get_events_for_aggregate(saga).await.unwrap().is_empty());
    }
}
