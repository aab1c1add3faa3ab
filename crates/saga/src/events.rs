//! Saga record events.
//!
//! Saga instances and saga steps are separate event-sourced records. Each
//! transition below is one persisted event and, once published, one
//! status-changed notification.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

/// Events recorded on a saga instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaInstanceEvent {
    /// Instance created in PENDING.
    SagaCreated(SagaCreatedData),

    /// Instance moved to RUNNING.
    SagaStarted(TransitionData),

    /// A step record was attached to the instance.
    StepAttached(StepAttachedData),

    /// Every attached step completed.
    SagaCompleted(TransitionData),

    /// A compensating action failed (compensation continues).
    CompensationFailed(CompensationFailedData),

    /// Instance moved to FAILED.
    SagaFailed(SagaFailedData),
}

impl DomainEvent for SagaInstanceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaInstanceEvent::SagaCreated(_) => "SagaCreated",
            SagaInstanceEvent::SagaStarted(_) => "SagaStarted",
            SagaInstanceEvent::StepAttached(_) => "StepAttached",
            SagaInstanceEvent::SagaCompleted(_) => "SagaCompleted",
            SagaInstanceEvent::CompensationFailed(_) => "CompensationFailed",
            SagaInstanceEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

impl SagaInstanceEvent {
    pub fn saga_created(saga_id: AggregateId, saga_type: impl Into<String>) -> Self {
        SagaInstanceEvent::SagaCreated(SagaCreatedData {
            saga_id,
            saga_type: saga_type.into(),
            created_at: Utc::now(),
        })
    }

    pub fn saga_started() -> Self {
        SagaInstanceEvent::SagaStarted(TransitionData::now())
    }

    pub fn step_attached(step_id: AggregateId, order: u32, name: impl Into<String>) -> Self {
        SagaInstanceEvent::StepAttached(StepAttachedData {
            step_id,
            order,
            name: name.into(),
            attached_at: Utc::now(),
        })
    }

    pub fn saga_completed() -> Self {
        SagaInstanceEvent::SagaCompleted(TransitionData::now())
    }

    pub fn compensation_failed(step_name: impl Into<String>, error: impl Into<String>) -> Self {
        SagaInstanceEvent::CompensationFailed(CompensationFailedData {
            step_name: step_name.into(),
            error: error.into(),
            failed_at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: impl Into<String>) -> Self {
        SagaInstanceEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}

/// Events recorded on a saga step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaStepEvent {
    /// Step record created in PENDING.
    StepCreated(StepCreatedData),

    StepStarted(TransitionData),

    StepRunning(TransitionData),

    StepCompleted(StepCompletedData),

    StepFailed(StepFailedData),

    /// Step returned to PENDING; dates and error cleared.
    StepReset(TransitionData),

    /// Retry counter bumped; status unchanged.
    RetryCountIncremented(RetryCountData),
}

impl DomainEvent for SagaStepEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaStepEvent::StepCreated(_) => "StepCreated",
            SagaStepEvent::StepStarted(_) => "StepStarted",
            SagaStepEvent::StepRunning(_) => "StepRunning",
            SagaStepEvent::StepCompleted(_) => "StepCompleted",
            SagaStepEvent::StepFailed(_) => "StepFailed",
            SagaStepEvent::StepReset(_) => "StepReset",
            SagaStepEvent::RetryCountIncremented(_) => "StepRetryIncremented",
        }
    }
}

impl SagaStepEvent {
    pub fn step_created(
        step_id: AggregateId,
        saga_id: AggregateId,
        name: impl Into<String>,
        order: u32,
        max_retries: u32,
        payload: serde_json::Value,
    ) -> Self {
        SagaStepEvent::StepCreated(StepCreatedData {
            step_id,
            saga_id,
            name: name.into(),
            order,
            max_retries,
            payload,
            created_at: Utc::now(),
        })
    }

    pub fn step_started() -> Self {
        SagaStepEvent::StepStarted(TransitionData::now())
    }

    pub fn step_running() -> Self {
        SagaStepEvent::StepRunning(TransitionData::now())
    }

    pub fn step_completed(result: serde_json::Value) -> Self {
        SagaStepEvent::StepCompleted(StepCompletedData {
            result,
            completed_at: Utc::now(),
        })
    }

    pub fn step_failed(error_message: Option<String>) -> Self {
        SagaStepEvent::StepFailed(StepFailedData {
            error_message,
            failed_at: Utc::now(),
        })
    }

    pub fn step_reset() -> Self {
        SagaStepEvent::StepReset(TransitionData::now())
    }

    pub fn retry_count_incremented(retry_count: u32) -> Self {
        SagaStepEvent::RetryCountIncremented(RetryCountData {
            retry_count,
            incremented_at: Utc::now(),
        })
    }
}

/// Data for events that only carry their timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionData {
    pub at: DateTime<Utc>,
}

impl TransitionData {
    fn now() -> Self {
        Self { at: Utc::now() }
    }
}

/// Data for SagaCreated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaCreatedData {
    /// The saga instance ID.
    pub saga_id: AggregateId,
    /// The workflow that produced the saga (e.g. "registration").
    pub saga_type: String,
    pub created_at: DateTime<Utc>,
}

/// Data for StepAttached event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAttachedData {
    pub step_id: AggregateId,
    pub order: u32,
    pub name: String,
    pub attached_at: DateTime<Utc>,
}

/// Data for CompensationFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationFailedData {
    /// The completed step whose compensation failed.
    pub step_name: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Data for SagaFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaFailedData {
    /// Reason for failure (the original step error).
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Data for StepCreated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCreatedData {
    pub step_id: AggregateId,
    pub saga_id: AggregateId,
    pub name: String,
    pub order: u32,
    pub max_retries: u32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedData {
    /// Whatever the forward action returned.
    pub result: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    pub error_message: Option<String>,
    pub failed_at: DateTime<Utc>,
}

/// Data for RetryCountIncremented event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryCountData {
    /// The counter value after the increment.
    pub retry_count: u32,
    pub incremented_at: DateTime<Utc>,
}
