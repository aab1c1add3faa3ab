//! Saga error types.

use std::time::Duration;

use common::AggregateId;
use domain::DomainError;
use thiserror::Error;

use crate::state::{SagaStatus, StepStatus};

/// Rejections raised by the saga instance and saga step records.
#[derive(Debug, Error)]
pub enum SagaRecordError {
    /// The record has not been created yet.
    #[error("{record} has not been created")]
    NotCreated { record: &'static str },

    /// The record already exists.
    #[error("{record} {id} already exists")]
    AlreadyCreated {
        record: &'static str,
        id: AggregateId,
    },

    /// The instance is not in a state that allows the action.
    #[error("Invalid saga transition: cannot {action} from {from}")]
    InvalidInstanceTransition {
        from: SagaStatus,
        action: &'static str,
    },

    /// The step is not in a state that allows the action.
    #[error("Invalid step transition: cannot {action} from {from}")]
    InvalidStepTransition {
        from: StepStatus,
        action: &'static str,
    },

    /// Attached steps must have strictly increasing order.
    #[error("Step order {order} must be greater than the last attached order {last}")]
    StepOrderNotIncreasing { order: u32, last: u32 },

    /// The instance cannot complete while attached steps are unfinished.
    #[error("Saga cannot complete, steps not completed: {}", .steps.join(", "))]
    IncompleteSteps { steps: Vec<String> },

    /// The step has used all of its retries.
    #[error("Retries exhausted: {retry_count} of {max_retries}")]
    RetriesExhausted { retry_count: u32, max_retries: u32 },
}

impl From<SagaRecordError> for DomainError {
    fn from(e: SagaRecordError) -> Self {
        DomainError::rejected(e)
    }
}

/// Errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A forward action failed. `source` is the original failure.
    #[error("Step '{step}' of saga {saga_id} failed: {source}")]
    StepFailed {
        saga_id: AggregateId,
        step: String,
        source: DomainError,
    },

    /// A forward action did not finish within the step timeout.
    #[error("Step '{step}' of saga {saga_id} timed out after {timeout:?}")]
    StepTimedOut {
        saga_id: AggregateId,
        step: String,
        timeout: Duration,
    },

    /// Creating or updating a saga record failed; forward progress was aborted.
    #[error("Saga {saga_id} bookkeeping failed: {source}")]
    Bookkeeping {
        saga_id: AggregateId,
        source: DomainError,
    },

    /// A step record was created but could not be attached to its saga,
    /// so reports built from the instance do not list it.
    #[error("Step '{step}' ({step_id}) of saga {saga_id} was created but not attached: {source}")]
    UnattachedStep {
        saga_id: AggregateId,
        step_id: AggregateId,
        step: String,
        source: DomainError,
    },

    /// A saga record could not be found.
    #[error("{record} {id} not found")]
    NotFound {
        record: &'static str,
        id: AggregateId,
    },
}

impl SagaError {
    /// Returns the saga this error belongs to, when known.
    pub fn saga_id(&self) -> Option<AggregateId> {
        match self {
            SagaError::StepFailed { saga_id, .. }
            | SagaError::StepTimedOut { saga_id, .. }
            | SagaError::Bookkeeping { saga_id, .. }
            | SagaError::UnattachedStep { saga_id, .. } => Some(*saga_id),
            SagaError::NotFound { record, id } if *record == "SagaInstance" => Some(*id),
            SagaError::NotFound { .. } => None,
        }
    }

    /// Returns the failing step name for step failures and timeouts.
    pub fn step(&self) -> Option<&str> {
        match self {
            SagaError::StepFailed { step, .. } | SagaError::StepTimedOut { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
