//! Workflow and step definitions.

use async_trait::async_trait;
use domain::{CommandDispatcher, DomainError};

/// A forward or compensating action of a saga step.
///
/// Actions run their business commands through the same dispatcher the
/// orchestrator uses for bookkeeping.
#[async_trait]
pub trait SagaAction: Send + Sync {
    /// Name of the action, used in logs.
    fn name(&self) -> &'static str;

    /// Runs the action and returns its result for the step record.
    async fn perform<D>(&self, dispatcher: &D) -> Result<serde_json::Value, DomainError>
    where
        D: CommandDispatcher;
}

/// One step of a workflow plan.
#[derive(Debug, Clone)]
pub struct StepDefinition<A> {
    /// Stable step name, recorded on the step record.
    pub name: &'static str,
    /// Input recorded on the step record. Must not carry secrets.
    pub payload: serde_json::Value,
    pub forward: A,
    /// Undo action. `None` marks the step as not compensatable.
    pub compensation: Option<A>,
    /// Steps excluded by their inclusion rule are never executed.
    pub include: bool,
}

impl<A: SagaAction> StepDefinition<A> {
    pub fn new(name: &'static str, forward: A) -> Self {
        Self {
            name,
            payload: serde_json::Value::Null,
            forward,
            compensation: None,
            include: true,
        }
    }

    pub fn compensate_with(mut self, compensation: A) -> Self {
        self.compensation = Some(compensation);
        self
    }

    /// Sets the inclusion rule result for this run.
    pub fn when(mut self, include: bool) -> Self {
        self.include = include;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A named, ordered list of steps the orchestrator can run.
pub trait Workflow: Send + Sync {
    type Action: SagaAction;

    /// Saga type recorded on the instance (e.g. "registration").
    fn saga_type(&self) -> &'static str;

    /// Steps in execution order, inclusion rules already evaluated.
    fn plan(&self) -> Vec<StepDefinition<Self::Action>>;
}
