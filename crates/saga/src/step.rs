//! Saga step record and its lifecycle commands.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, Command};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::error::SagaRecordError;
use crate::events::SagaStepEvent;
use crate::state::StepStatus;

const RECORD: &str = "SagaStep";

/// Progress record for one step of one saga run.
///
/// Created PENDING just before the forward action is invoked and never
/// deleted. `error_message` is only ever set by a failure and is cleared
/// when the step is reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaStep {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    saga_id: Option<AggregateId>,
    name: String,
    order: u32,
    status: StepStatus,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    error_message: Option<String>,
    retry_count: u32,
    max_retries: u32,
    payload: serde_json::Value,
    result: Option<serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for SagaStep {
    type Event = SagaStepEvent;
    type Error = SagaRecordError;

    fn aggregate_type() -> &'static str {
        RECORD
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SagaStepEvent::StepCreated(data) => {
                self.id = Some(data.step_id);
                self.saga_id = Some(data.saga_id);
                self.name = data.name;
                self.order = data.order;
                self.max_retries = data.max_retries;
                self.payload = data.payload;
                self.status = StepStatus::Pending;
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            SagaStepEvent::StepStarted(data) => {
                self.status = StepStatus::Started;
                self.start_date = Some(data.at);
                self.end_date = None;
                self.updated_at = Some(data.at);
            }
            SagaStepEvent::StepRunning(data) => {
                self.status = StepStatus::Running;
                self.end_date = None;
                self.updated_at = Some(data.at);
            }
            SagaStepEvent::StepCompleted(data) => {
                self.status = StepStatus::Completed;
                self.end_date = Some(data.completed_at);
                self.result = Some(data.result);
                self.updated_at = Some(data.completed_at);
            }
            SagaStepEvent::StepFailed(data) => {
                self.status = StepStatus::Failed;
                self.end_date = Some(data.failed_at);
                if let Some(message) = data.error_message {
                    self.error_message = Some(message);
                }
                self.updated_at = Some(data.failed_at);
            }
            SagaStepEvent::StepReset(data) => {
                self.status = StepStatus::Pending;
                self.start_date = None;
                self.end_date = None;
                self.error_message = None;
                self.updated_at = Some(data.at);
            }
            SagaStepEvent::RetryCountIncremented(data) => {
                self.retry_count = data.retry_count;
                self.updated_at = Some(data.incremented_at);
            }
        }
    }
}

// Query methods
impl SagaStep {
    pub fn saga_id(&self) -> Option<AggregateId> {
        self.saga_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of retries still available.
    pub fn retries_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

// Command methods (return events)
impl SagaStep {
    pub fn create(
        &self,
        step_id: AggregateId,
        saga_id: AggregateId,
        name: &str,
        order: u32,
        max_retries: u32,
        payload: serde_json::Value,
    ) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        if self.id.is_some() {
            return Err(SagaRecordError::AlreadyCreated {
                record: RECORD,
                id: step_id,
            });
        }
        Ok(vec![SagaStepEvent::step_created(
            step_id,
            saga_id,
            name,
            order,
            max_retries,
            payload,
        )])
    }

    pub fn mark_as_started(&self) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.can_start() {
            return Err(self.invalid("start"));
        }
        Ok(vec![SagaStepEvent::step_started()])
    }

    pub fn mark_as_running(&self) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.can_run() {
            return Err(self.invalid("run"));
        }
        Ok(vec![SagaStepEvent::step_running()])
    }

    pub fn mark_as_completed(
        &self,
        result: serde_json::Value,
    ) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.can_finish() {
            return Err(self.invalid("complete"));
        }
        Ok(vec![SagaStepEvent::step_completed(result)])
    }

    pub fn mark_as_failed(
        &self,
        error_message: Option<String>,
    ) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.can_finish() {
            return Err(self.invalid("fail"));
        }
        Ok(vec![SagaStepEvent::step_failed(error_message)])
    }

    /// Resets the step to PENDING from any state.
    pub fn mark_as_pending(&self) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        self.ensure_created()?;
        Ok(vec![SagaStepEvent::step_reset()])
    }

    pub fn increment_retry_count(&self) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        self.ensure_created()?;
        if self.retry_count >= self.max_retries {
            return Err(SagaRecordError::RetriesExhausted {
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        Ok(vec![SagaStepEvent::retry_count_incremented(
            self.retry_count + 1,
        )])
    }

    fn ensure_created(&self) -> Result<(), SagaRecordError> {
        if self.id.is_none() {
            return Err(SagaRecordError::NotCreated { record: RECORD });
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> SagaRecordError {
        SagaRecordError::InvalidStepTransition {
            from: self.status,
            action,
        }
    }
}

/// Creates a step record in PENDING.
#[derive(Debug, Clone)]
pub struct CreateSagaStep {
    pub step_id: AggregateId,
    pub saga_id: AggregateId,
    pub name: String,
    pub order: u32,
    pub max_retries: u32,
    pub payload: serde_json::Value,
}

impl Command for CreateSagaStep {
    type Aggregate = SagaStep;

    fn name(&self) -> &'static str {
        "create_saga_step"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.step_id
    }

    fn handle(&self, step: &SagaStep) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        step.create(
            self.step_id,
            self.saga_id,
            &self.name,
            self.order,
            self.max_retries,
            self.payload.clone(),
        )
    }
}

/// Declares one step lifecycle command that carries only the step id.
macro_rules! step_command {
    ($(#[$doc:meta])* $command:ident, $name:literal, $method:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $command {
            pub step_id: AggregateId,
        }

        impl Command for $command {
            type Aggregate = SagaStep;

            fn name(&self) -> &'static str {
                $name
            }

            fn aggregate_id(&self) -> AggregateId {
                self.step_id
            }

            fn handle(&self, step: &SagaStep) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
                step.$method()
            }
        }
    };
}

step_command!(
    /// Marks a step STARTED.
    MarkStepStarted,
    "mark_step_started",
    mark_as_started
);
step_command!(
    /// Marks a step RUNNING.
    MarkStepRunning,
    "mark_step_running",
    mark_as_running
);
step_command!(
    /// Returns a step to PENDING.
    ResetStep,
    "reset_step",
    mark_as_pending
);
step_command!(
    /// Bumps a step's retry counter.
    IncrementStepRetry,
    "increment_step_retry",
    increment_retry_count
);

/// Marks a step COMPLETED with the forward action's result.
#[derive(Debug, Clone)]
pub struct MarkStepCompleted {
    pub step_id: AggregateId,
    pub result: serde_json::Value,
}

impl Command for MarkStepCompleted {
    type Aggregate = SagaStep;

    fn name(&self) -> &'static str {
        "mark_step_completed"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.step_id
    }

    fn handle(&self, step: &SagaStep) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        step.mark_as_completed(self.result.clone())
    }
}

/// Marks a step FAILED.
#[derive(Debug, Clone)]
pub struct MarkStepFailed {
    pub step_id: AggregateId,
    pub error_message: Option<String>,
}

impl Command for MarkStepFailed {
    type Aggregate = SagaStep;

    fn name(&self) -> &'static str {
        "mark_step_failed"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.step_id
    }

    fn handle(&self, step: &SagaStep) -> Result<Vec<SagaStepEvent>, SagaRecordError> {
        step.mark_as_failed(self.error_message.clone())
    }
}
