//! Saga orchestrator.

use std::time::Instant;

use common::AggregateId;
use domain::{Aggregate, CommandDispatcher, DomainError};
use serde::{Deserialize, Serialize};

use crate::config::SagaConfig;
use crate::definition::{SagaAction, StepDefinition, Workflow};
use crate::error::SagaError;
use crate::instance::SagaInstance;
use crate::stack::{CompletedStack, CompletedStep};
use crate::state::SagaStatus;
use crate::step::SagaStep;
use crate::tracker::StepTracker;

/// Persisted state of one saga run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaReport {
    pub saga_id: AggregateId,
    pub instance: SagaInstance,
    /// Step records in attachment order.
    pub steps: Vec<SagaStep>,
}

impl SagaReport {
    pub fn status(&self) -> SagaStatus {
        self.instance.status()
    }

    /// Names of the steps that were attempted, in order.
    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn step(&self, name: &str) -> Option<&SagaStep> {
        self.steps.iter().find(|step| step.name() == name)
    }
}

/// Runs workflows step by step, compensating completed steps in reverse
/// order when one fails.
///
/// Every record change and every business action goes through the
/// dispatcher and is awaited before the next one is issued.
pub struct SagaOrchestrator<D> {
    dispatcher: D,
    config: SagaConfig,
}

impl<D: CommandDispatcher> SagaOrchestrator<D> {
    pub fn new(dispatcher: D, config: SagaConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Executes one run of `workflow`.
    ///
    /// On failure the returned error is the one that stopped forward
    /// execution, even if compensation or the final status update failed.
    #[tracing::instrument(skip(self, workflow), fields(saga_type = workflow.saga_type()))]
    pub async fn run<W: Workflow>(&self, workflow: &W) -> Result<SagaReport, SagaError> {
        let saga_type = workflow.saga_type();
        metrics::counter!("saga_executions_total", "saga_type" => saga_type).increment(1);
        let started = Instant::now();

        let saga_id = AggregateId::new();
        let tracker = StepTracker::new(&self.dispatcher);
        let bookkeeping = |source: DomainError| SagaError::Bookkeeping { saga_id, source };

        let prepared = match tracker.create_instance(saga_id, saga_type).await {
            Ok(_) => tracker.start_instance(saga_id).await,
            Err(e) => Err(e),
        };
        if let Err(source) = prepared {
            tracing::error!(%saga_id, error = %source, "failed to open saga instance");
            metrics::counter!("saga_failed_total").increment(1);
            return Err(bookkeeping(source));
        }

        let mut stack = CompletedStack::new();
        let mut outcome = Ok(());
        let included = workflow.plan().into_iter().filter(|step| step.include);
        for (order, step) in (1u32..).zip(included) {
            if let Err(e) = self
                .execute_step(&tracker, saga_id, order, step, &mut stack)
                .await
            {
                outcome = Err(e);
                break;
            }
        }

        let outcome = match outcome {
            Ok(()) => {
                let completed: Vec<AggregateId> =
                    stack.records().filter_map(|record| record.id()).collect();
                tracker
                    .complete_instance(saga_id, completed)
                    .await
                    .map_err(bookkeeping)
            }
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(instance) => {
                metrics::counter!("saga_completed_total").increment(1);
                metrics::histogram!("saga_duration_seconds").record(elapsed);
                tracing::info!(%saga_id, steps = stack.len(), "saga completed");
                Ok(SagaReport {
                    saga_id,
                    instance,
                    steps: stack.records().cloned().collect(),
                })
            }
            Err(error) => {
                tracing::warn!(%saga_id, error = %error, "saga failed, compensating");
                self.compensate(&tracker, saga_id, stack).await;

                if let Err(e) = tracker.fail_instance(saga_id, &error.to_string()).await {
                    tracing::error!(%saga_id, error = %e, "failed to mark saga as failed");
                }

                metrics::counter!("saga_failed_total").increment(1);
                metrics::histogram!("saga_duration_seconds").record(elapsed);
                Err(error)
            }
        }
    }

    /// Loads a saga instance and its step records.
    #[tracing::instrument(skip(self))]
    pub async fn inspect(&self, saga_id: AggregateId) -> Result<SagaReport, SagaError> {
        let instance: SagaInstance = self
            .dispatcher
            .load(saga_id)
            .await
            .map_err(|source| SagaError::Bookkeeping { saga_id, source })?
            .ok_or(SagaError::NotFound {
                record: SagaInstance::aggregate_type(),
                id: saga_id,
            })?;

        let mut steps = Vec::with_capacity(instance.steps().len());
        for step_ref in instance.steps() {
            let step: SagaStep = self
                .dispatcher
                .load(step_ref.step_id)
                .await
                .map_err(|source| SagaError::Bookkeeping { saga_id, source })?
                .ok_or(SagaError::NotFound {
                    record: SagaStep::aggregate_type(),
                    id: step_ref.step_id,
                })?;
            steps.push(step);
        }

        Ok(SagaReport {
            saga_id,
            instance,
            steps,
        })
    }

    /// Runs one step to completion, retrying while the step has retries left.
    ///
    /// A step whose forward action succeeded is pushed onto `stack` even if
    /// recording the completion fails, so its effect is still compensated.
    /// A timed-out forward action may have been applied before it was
    /// dropped: the step is failed without a retry and pushed as well.
    async fn execute_step<A: SagaAction>(
        &self,
        tracker: &StepTracker<'_, D>,
        saga_id: AggregateId,
        order: u32,
        step: StepDefinition<A>,
        stack: &mut CompletedStack<A>,
    ) -> Result<(), SagaError> {
        let bookkeeping = |source: DomainError| SagaError::Bookkeeping { saga_id, source };
        let step_id = AggregateId::new();

        let mut record = tracker
            .create_step(
                saga_id,
                step_id,
                order,
                step.name,
                self.config.max_retries,
                step.payload.clone(),
            )
            .await
            .map_err(bookkeeping)?;

        if let Err(source) = tracker.attach_step(saga_id, step_id, order, step.name).await {
            tracing::error!(%saga_id, %step_id, step = step.name, error = %source, "step record is not attached to its saga");
            return Err(SagaError::UnattachedStep {
                saga_id,
                step_id,
                step: step.name.to_string(),
                source,
            });
        }

        loop {
            tracker.mark_started(step_id).await.map_err(bookkeeping)?;
            tracker.mark_running(step_id).await.map_err(bookkeeping)?;
            tracing::info!(%saga_id, step = step.name, action = step.forward.name(), "saga step running");

            let attempt =
                tokio::time::timeout(self.config.step_timeout, step.forward.perform(&self.dispatcher))
                    .await;

            let timed_out = attempt.is_err();
            let (failure, message) = match attempt {
                Ok(Ok(result)) => {
                    let completed = tracker.mark_completed(step_id, result).await;
                    let (record, outcome) = match completed {
                        Ok(record) => (record, Ok(())),
                        Err(source) => (record, Err(bookkeeping(source))),
                    };
                    stack.push(CompletedStep {
                        name: step.name,
                        record,
                        compensation: step.compensation,
                    });
                    return outcome;
                }
                Ok(Err(source)) => {
                    let message = source.to_string();
                    let failure = SagaError::StepFailed {
                        saga_id,
                        step: step.name.to_string(),
                        source,
                    };
                    (failure, message)
                }
                Err(_) => {
                    let failure = SagaError::StepTimedOut {
                        saga_id,
                        step: step.name.to_string(),
                        timeout: self.config.step_timeout,
                    };
                    let message = failure.to_string();
                    (failure, message)
                }
            };

            tracing::warn!(%saga_id, step = step.name, error = %message, "saga step failed");
            let marked = tracker
                .mark_failed(step_id, Some(message))
                .await
                .map_err(bookkeeping);

            if timed_out {
                tracing::warn!(%saga_id, step = step.name, "timed-out step may have been applied, scheduling its compensation");
                let failed = match &marked {
                    Ok(failed) => failed.clone(),
                    Err(_) => record,
                };
                stack.push(CompletedStep {
                    name: step.name,
                    record: failed,
                    compensation: step.compensation,
                });
                return marked.and(Err(failure));
            }
            record = marked?;

            if record.retries_remaining() == 0 {
                return Err(failure);
            }

            record = tracker.increment_retry(step_id).await.map_err(bookkeeping)?;
            tracker.reset(step_id).await.map_err(bookkeeping)?;
            metrics::counter!("saga_step_retries_total").increment(1);

            let delay = self.config.backoff_for(record.retry_count());
            tracing::info!(
                %saga_id,
                step = step.name,
                retry = record.retry_count(),
                max_retries = record.max_retries(),
                ?delay,
                "retrying saga step"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Pops the stack to empty, running each compensation once.
    async fn compensate<A: SagaAction>(
        &self,
        tracker: &StepTracker<'_, D>,
        saga_id: AggregateId,
        mut stack: CompletedStack<A>,
    ) {
        while let Some(completed) = stack.pop() {
            let Some(compensation) = completed.compensation else {
                tracing::warn!(%saga_id, step = completed.name, "step is not compensatable, skipping");
                continue;
            };

            metrics::counter!("saga_compensations_total").increment(1);
            tracing::info!(%saga_id, step = completed.name, action = compensation.name(), "compensating saga step");

            let attempt =
                tokio::time::timeout(self.config.step_timeout, compensation.perform(&self.dispatcher))
                    .await;
            let error = match attempt {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "compensation timed out after {:?}",
                    self.config.step_timeout
                ),
            };

            metrics::counter!("saga_compensation_failures_total").increment(1);
            tracing::warn!(%saga_id, step = completed.name, error = %error, "compensation failed, continuing");

            if let Err(e) = tracker
                .record_compensation_failure(saga_id, completed.name, &error)
                .await
            {
                tracing::error!(%saga_id, step = completed.name, error = %e, "failed to record compensation failure");
            }
        }
    }
}
