//! Persists saga instance and step transitions through the dispatcher.

use common::AggregateId;
use domain::{CommandDispatcher, DomainError};

use crate::instance::{
    AttachSagaStep, CompleteSaga, CreateSagaInstance, FailSaga, RecordCompensationFailure,
    SagaInstance, StartSaga,
};
use crate::step::{
    CreateSagaStep, IncrementStepRetry, MarkStepCompleted, MarkStepFailed, MarkStepRunning,
    MarkStepStarted, ResetStep, SagaStep,
};

/// Bookkeeping facade over the saga records.
///
/// Each call is one command, so each transition is one persisted event and
/// one published notification. Every method returns the record as it
/// stands after the transition.
pub struct StepTracker<'a, D> {
    dispatcher: &'a D,
}

impl<'a, D: CommandDispatcher> StepTracker<'a, D> {
    pub fn new(dispatcher: &'a D) -> Self {
        Self { dispatcher }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_instance(
        &self,
        saga_id: AggregateId,
        saga_type: &str,
    ) -> Result<SagaInstance, DomainError> {
        let result = self
            .dispatcher
            .dispatch(CreateSagaInstance::new(saga_id, saga_type))
            .await?;
        tracing::info!(%saga_id, saga_type, "saga instance created");
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn start_instance(&self, saga_id: AggregateId) -> Result<SagaInstance, DomainError> {
        let result = self.dispatcher.dispatch(StartSaga { saga_id }).await?;
        tracing::info!(%saga_id, status = %result.aggregate.status(), "saga instance started");
        Ok(result.aggregate)
    }

    /// Creates a PENDING step record. It is not part of the instance until
    /// [`attach_step`](Self::attach_step) succeeds.
    #[tracing::instrument(skip(self, payload))]
    pub async fn create_step(
        &self,
        saga_id: AggregateId,
        step_id: AggregateId,
        order: u32,
        name: &str,
        max_retries: u32,
        payload: serde_json::Value,
    ) -> Result<SagaStep, DomainError> {
        let step = self
            .dispatcher
            .dispatch(CreateSagaStep {
                step_id,
                saga_id,
                name: name.to_string(),
                order,
                max_retries,
                payload,
            })
            .await?
            .aggregate;

        tracing::info!(%saga_id, %step_id, order, step = name, "saga step created");
        Ok(step)
    }

    /// Records `step_id` on the instance so that it shows up in reports.
    pub async fn attach_step(
        &self,
        saga_id: AggregateId,
        step_id: AggregateId,
        order: u32,
        name: &str,
    ) -> Result<SagaInstance, DomainError> {
        let result = self
            .dispatcher
            .dispatch(AttachSagaStep {
                saga_id,
                step_id,
                order,
                name: name.to_string(),
            })
            .await?;
        Ok(result.aggregate)
    }

    pub async fn mark_started(&self, step_id: AggregateId) -> Result<SagaStep, DomainError> {
        self.transition(MarkStepStarted { step_id }).await
    }

    pub async fn mark_running(&self, step_id: AggregateId) -> Result<SagaStep, DomainError> {
        self.transition(MarkStepRunning { step_id }).await
    }

    pub async fn mark_completed(
        &self,
        step_id: AggregateId,
        result: serde_json::Value,
    ) -> Result<SagaStep, DomainError> {
        self.transition(MarkStepCompleted { step_id, result }).await
    }

    pub async fn mark_failed(
        &self,
        step_id: AggregateId,
        error_message: Option<String>,
    ) -> Result<SagaStep, DomainError> {
        self.transition(MarkStepFailed {
            step_id,
            error_message,
        })
        .await
    }

    /// Returns the step to PENDING for another attempt.
    pub async fn reset(&self, step_id: AggregateId) -> Result<SagaStep, DomainError> {
        self.transition(ResetStep { step_id }).await
    }

    pub async fn increment_retry(&self, step_id: AggregateId) -> Result<SagaStep, DomainError> {
        self.transition(IncrementStepRetry { step_id }).await
    }

    #[tracing::instrument(skip(self, completed_steps))]
    pub async fn complete_instance(
        &self,
        saga_id: AggregateId,
        completed_steps: Vec<AggregateId>,
    ) -> Result<SagaInstance, DomainError> {
        let result = self
            .dispatcher
            .dispatch(CompleteSaga {
                saga_id,
                completed_steps,
            })
            .await?;
        tracing::info!(%saga_id, "saga instance completed");
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn fail_instance(
        &self,
        saga_id: AggregateId,
        reason: &str,
    ) -> Result<SagaInstance, DomainError> {
        let result = self
            .dispatcher
            .dispatch(FailSaga {
                saga_id,
                reason: reason.to_string(),
            })
            .await?;
        tracing::info!(%saga_id, "saga instance failed");
        Ok(result.aggregate)
    }

    pub async fn record_compensation_failure(
        &self,
        saga_id: AggregateId,
        step_name: &str,
        error: &str,
    ) -> Result<SagaInstance, DomainError> {
        let result = self
            .dispatcher
            .dispatch(RecordCompensationFailure {
                saga_id,
                step_name: step_name.to_string(),
                error: error.to_string(),
            })
            .await?;
        Ok(result.aggregate)
    }

    async fn transition<C>(&self, command: C) -> Result<SagaStep, DomainError>
    where
        C: domain::Command<Aggregate = SagaStep> + 'static,
    {
        let step_id = command.aggregate_id();
        let action = command.name();
        let step = self.dispatcher.dispatch(command).await?.aggregate;
        tracing::info!(
            %step_id,
            step = step.name(),
            status = %step.status(),
            action,
            "saga step transitioned"
        );
        Ok(step)
    }
}
