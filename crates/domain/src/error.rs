//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::identity::IdentityError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An identity entity rejected a command.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// A command was rejected by an aggregate defined outside this crate.
    #[error("Command rejected: {0}")]
    Rejected(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// A stream holds events of a different aggregate type than requested.
    #[error("Aggregate {aggregate_id} is a {found}, not a {expected}")]
    AggregateTypeMismatch {
        aggregate_id: AggregateId,
        expected: &'static str,
        found: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Events were persisted but could not be published.
    #[error("Publication error: {0}")]
    Publication(String),
}

impl DomainError {
    /// Wraps an aggregate-specific error as a rejection.
    pub fn rejected(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        DomainError::Rejected(Box::new(error))
    }

    /// Returns true when the failure is a stale-version write.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
        )
    }
}
