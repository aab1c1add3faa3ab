//! Runner error types with exit code mapping.

use event_store::EventStoreError;
use saga::SagaError;
use thiserror::Error;

/// Errors that end a runner invocation.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Rejected command line, or a request for help or version output.
    #[error(transparent)]
    Usage(#[from] clap::Error),

    /// Stdin did not hold a valid registration request.
    #[error("Invalid registration request: {0}")]
    InvalidRequest(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Saga(#[from] SagaError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Output could not be rendered as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl RunnerError {
    /// Process exit code for this error.
    ///
    /// Invalid invocations exit with 2, failed runs with 1. Help and
    /// version output exit with 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunnerError::Usage(e) => u8::try_from(e.exit_code()).unwrap_or(2),
            RunnerError::InvalidRequest(_) => 2,
            _ => 1,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, RunnerError::Usage(_))
    }
}
