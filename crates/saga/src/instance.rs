//! Saga instance record.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, Command};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::error::SagaRecordError;
use crate::events::SagaInstanceEvent;
use crate::state::SagaStatus;

const RECORD: &str = "SagaInstance";

/// Reference from an instance to one of its step records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub step_id: AggregateId,
    pub order: u32,
    pub name: String,
}

/// A compensating action that failed while unwinding the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationFailure {
    pub step_name: String,
    pub error: String,
}

/// An event-sourced saga instance.
///
/// Owned by the orchestrator: step logic never touches it. The instance
/// refuses to complete unless the caller proves every attached step is
/// completed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    saga_type: String,
    status: SagaStatus,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    steps: Vec<StepRef>,
    failure_reason: Option<String>,
    compensation_failures: Vec<CompensationFailure>,
}

impl Aggregate for SagaInstance {
    type Event = SagaInstanceEvent;
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
            SagaInstanceEvent::SagaCreated(data) => {
                self.id = Some(data.saga_id);
                self.saga_type = data.saga_type;
                self.status = SagaStatus::Pending;
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            SagaInstanceEvent::SagaStarted(data) => {
                self.status = SagaStatus::Running;
                self.updated_at = Some(data.at);
            }
            SagaInstanceEvent::StepAttached(data) => {
                self.steps.push(StepRef {
                    step_id: data.step_id,
                    order: data.order,
                    name: data.name,
                });
                self.updated_at = Some(data.attached_at);
            }
            SagaInstanceEvent::SagaCompleted(data) => {
                self.status = SagaStatus::Completed;
                self.updated_at = Some(data.at);
            }
            SagaInstanceEvent::CompensationFailed(data) => {
                self.compensation_failures.push(CompensationFailure {
                    step_name: data.step_name,
                    error: data.error,
                });
                self.updated_at = Some(data.failed_at);
            }
            SagaInstanceEvent::SagaFailed(data) => {
                self.status = SagaStatus::Failed;
                self.failure_reason = Some(data.reason);
                self.updated_at = Some(data.failed_at);
            }
        }
    }
}

// Query methods
impl SagaInstance {
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Attached steps in attachment order.
    pub fn steps(&self) -> &[StepRef] {
        &self.steps
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn compensation_failures(&self) -> &[CompensationFailure] {
        &self.compensation_failures
    }
}

// Command methods (return events)
impl SagaInstance {
    pub fn create(
        &self,
        saga_id: AggregateId,
        saga_type: &str,
    ) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        if self.id.is_some() {
            return Err(SagaRecordError::AlreadyCreated {
                record: RECORD,
                id: saga_id,
            });
        }
        Ok(vec![SagaInstanceEvent::saga_created(saga_id, saga_type)])
    }

    pub fn start(&self) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.can_start() {
            return Err(self.invalid("start"));
        }
        Ok(vec![SagaInstanceEvent::saga_started()])
    }

    pub fn attach_step(
        &self,
        step_id: AggregateId,
        order: u32,
        name: &str,
    ) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.accepts_steps() {
            return Err(self.invalid("attach a step"));
        }
        if let Some(last) = self.steps.last()
            && order <= last.order
        {
            return Err(SagaRecordError::StepOrderNotIncreasing {
                order,
                last: last.order,
            });
        }
        Ok(vec![SagaInstanceEvent::step_attached(step_id, order, name)])
    }

    /// Completes the saga. `completed_steps` must cover every attached step.
    pub fn complete(
        &self,
        completed_steps: &[AggregateId],
    ) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.can_finish() {
            return Err(self.invalid("complete"));
        }

        let completed: HashSet<&AggregateId> = completed_steps.iter().collect();
        let missing: Vec<String> = self
            .steps
            .iter()
            .filter(|step| !completed.contains(&step.step_id))
            .map(|step| step.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(SagaRecordError::IncompleteSteps { steps: missing });
        }

        Ok(vec![SagaInstanceEvent::saga_completed()])
    }

    pub fn fail(&self, reason: &str) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.can_finish() {
            return Err(self.invalid("fail"));
        }
        Ok(vec![SagaInstanceEvent::saga_failed(reason)])
    }

    pub fn record_compensation_failure(
        &self,
        step_name: &str,
        error: &str,
    ) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        self.ensure_created()?;
        if !self.status.accepts_steps() {
            return Err(self.invalid("record a compensation failure"));
        }
        Ok(vec![SagaInstanceEvent::compensation_failed(step_name, error)])
    }

    fn ensure_created(&self) -> Result<(), SagaRecordError> {
        if self.id.is_none() {
            return Err(SagaRecordError::NotCreated { record: RECORD });
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> SagaRecordError {
        SagaRecordError::InvalidInstanceTransition {
            from: self.status,
            action,
        }
    }
}

/// Creates a saga instance in PENDING.
#[derive(Debug, Clone)]
pub struct CreateSagaInstance {
    pub saga_id: AggregateId,
    pub saga_type: String,
}

impl CreateSagaInstance {
    pub fn new(saga_id: AggregateId, saga_type: impl Into<String>) -> Self {
        Self {
            saga_id,
            saga_type: saga_type.into(),
        }
    }
}

impl Command for CreateSagaInstance {
    type Aggregate = SagaInstance;

    fn name(&self) -> &'static str {
        "create_saga_instance"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn handle(&self, saga: &SagaInstance) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        saga.create(self.saga_id, &self.saga_type)
    }
}

/// Moves a saga instance to RUNNING.
#[derive(Debug, Clone)]
pub struct StartSaga {
    pub saga_id: AggregateId,
}

impl Command for StartSaga {
    type Aggregate = SagaInstance;

    fn name(&self) -> &'static str {
        "start_saga"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn handle(&self, saga: &SagaInstance) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        saga.start()
    }
}

/// Attaches a step record to a running saga.
#[derive(Debug, Clone)]
pub struct AttachSagaStep {
    pub saga_id: AggregateId,
    pub step_id: AggregateId,
    pub order: u32,
    pub name: String,
}

impl Command for AttachSagaStep {
    type Aggregate = SagaInstance;

    fn name(&self) -> &'static str {
        "attach_saga_step"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn handle(&self, saga: &SagaInstance) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        saga.attach_step(self.step_id, self.order, &self.name)
    }
}

/// Moves a saga instance to COMPLETED.
#[derive(Debug, Clone)]
pub struct CompleteSaga {
    pub saga_id: AggregateId,
    /// Ids of the step records that reached COMPLETED.
    pub completed_steps: Vec<AggregateId>,
}

impl Command for CompleteSaga {
    type Aggregate = SagaInstance;

    fn name(&self) -> &'static str {
        "complete_saga"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn handle(&self, saga: &SagaInstance) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        saga.complete(&self.completed_steps)
    }
}

/// Moves a saga instance to FAILED.
#[derive(Debug, Clone)]
pub struct FailSaga {
    pub saga_id: AggregateId,
    pub reason: String,
}

impl Command for FailSaga {
    type Aggregate = SagaInstance;

    fn name(&self) -> &'static str {
        "fail_saga"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn handle(&self, saga: &SagaInstance) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        saga.fail(&self.reason)
    }
}

/// Records a failed compensating action on a running saga.
#[derive(Debug, Clone)]
pub struct RecordCompensationFailure {
    pub saga_id: AggregateId,
    pub step_name: String,
    pub error: String,
}

impl Command for RecordCompensationFailure {
    type Aggregate = SagaInstance;

    fn name(&self) -> &'static str {
        "record_compensation_failure"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn handle(&self, saga: &SagaInstance) -> Result<Vec<SagaInstanceEvent>, SagaRecordError> {
        saga.record_compensation_failure(&self.step_name, &self.error)
    }
}
