//! Saga orchestration for multi-step workflows.
//!
//! This crate provides:
//! - event-sourced saga instance and saga step records with guarded state machines
//! - a `StepTracker` that persists every record transition through the dispatcher
//! - the `SagaOrchestrator`, which runs a `Workflow` step by step with retries
//!   and timeouts, and on failure compensates completed steps in reverse order
//! - the registration workflow (user, credential, optional organization and
//!   owner membership)
//! - a `RecordingDispatcher` for journaling and fault injection in tests
//!
//! A failed run always surfaces the error of the step that stopped it.

pub mod config;
pub mod definition;
pub mod error;
pub mod events;
pub mod instance;
pub mod orchestrator;
pub mod recording;
pub mod registration;
pub mod stack;
pub mod state;
pub mod step;
pub mod tracker;

pub use config::SagaConfig;
pub use definition::{SagaAction, StepDefinition, Workflow};
pub use error::{Result, SagaError, SagaRecordError};
pub use events::{SagaInstanceEvent, SagaStepEvent};
pub use instance::{CompensationFailure, SagaInstance, StepRef};
pub use orchestrator::{SagaOrchestrator, SagaReport};
pub use recording::{InjectedFailure, RecordingDispatcher};
pub use registration::{
    Registration, RegistrationAction, RegistrationIds, RegistrationRequest, RegistrationService,
    RegistrationWorkflow,
};
pub use stack::{CompletedStack, CompletedStep};
pub use state::{SagaStatus, StepStatus};
pub use step::SagaStep;
pub use tracker::StepTracker;
