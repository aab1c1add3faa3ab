use thiserror::Error;

use crate::{AggregateId, Version};

#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer moved the stream past the version this append was
    /// decided against.
    #[error("stream {aggregate_id} is at version {actual}, writer expected {expected}")]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    #[error("rejected append batch: {0}")]
    InvalidAppend(String),

    /// Raised by [`crate::EventEnvelopeBuilder::build`].
    #[error("event envelope has no {0}")]
    IncompleteEnvelope(&'static str),

    #[error("postgres: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("event (de)serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    pub(crate) fn conflict(aggregate_id: AggregateId, expected: Version, actual: Version) -> Self {
        metrics::counter!("event_store_conflicts_total").increment(1);
        Self::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, EventStoreError>;
