//! Event publication after a successful append.

use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::error::DomainError;

/// Receives every batch of events the dispatcher has just persisted.
///
/// This is the notification side channel for record and entity changes:
/// a step moving to RUNNING or a user being created reaches subscribers
/// only through here.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a batch of persisted events, in version order.
    ///
    /// The batch is already durable when this is called. A returned error
    /// is logged and counted by the dispatcher; the command still succeeds.
    async fn publish(&self, events: &[EventEnvelope]) -> Result<(), DomainError>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, events: &[EventEnvelope]) -> Result<(), DomainError> {
        (**self).publish(events).await
    }
}

/// Keeps every published event in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    published: Arc<RwLock<Vec<EventEnvelope>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything published so far.
    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.published.read().await.clone()
    }

    /// Returns the published event types in publication order.
    pub async fn event_types(&self) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, events: &[EventEnvelope]) -> Result<(), DomainError> {
        self.published.write().await.extend_from_slice(events);
        Ok(())
    }
}

/// Emits one structured log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, events: &[EventEnvelope]) -> Result<(), DomainError> {
        for event in events {
            tracing::info!(
                event_type = %event.event_type,
                aggregate_type = %event.aggregate_type,
                aggregate_id = %event.aggregate_id,
                version = %event.version,
                "event published"
            );
        }
        metrics::counter!("events_published_total").increment(events.len() as u64);
        Ok(())
    }
}
