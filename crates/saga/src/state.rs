//! Saga instance and saga step state machines.

use serde::{Deserialize, Serialize};

/// The status of a saga instance.
///
/// State transitions:
/// ```text
/// PENDING ──► RUNNING ──┬──► COMPLETED
///                       └──► FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Created, no step has run yet.
    #[default]
    Pending,

    /// Steps are executing or being compensated.
    Running,

    /// Every included step completed (terminal state).
    Completed,

    /// A step failed or the run was aborted (terminal state).
    Failed,
}

impl SagaStatus {
    /// Returns true if the saga can start running.
    pub fn can_start(&self) -> bool {
        matches!(self, SagaStatus::Pending)
    }

    /// Returns true if the saga can move to a terminal state.
    pub fn can_finish(&self) -> bool {
        matches!(self, SagaStatus::Running)
    }

    /// Returns true if steps may be attached or compensation failures recorded.
    pub fn accepts_steps(&self) -> bool {
        matches!(self, SagaStatus::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Pending => "PENDING",
            SagaStatus::Running => "RUNNING",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a single saga step.
///
/// State transitions:
/// ```text
/// PENDING ──► STARTED ──► RUNNING ──┬──► COMPLETED
///    ▲                              └──► FAILED
///    └────────────── reset ─────────────────┘
/// ```
/// A step may also complete or fail straight from STARTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    #[default]
    Pending,
    Started,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    /// Returns true if the step can be marked started.
    pub fn can_start(&self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::Started)
    }

    /// Returns true if the step can be marked running.
    pub fn can_run(&self) -> bool {
        matches!(self, StepStatus::Started | StepStatus::Running)
    }

    /// Returns true if the step can be marked completed or failed.
    pub fn can_finish(&self) -> bool {
        matches!(self, StepStatus::Started | StepStatus::Running)
    }

    /// Returns true if this is a terminal state (until reset).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Started => "STARTED",
            StepStatus::Running => "RUNNING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_pending() {
        assert_eq!(SagaStatus::default(), SagaStatus::Pending);
        assert_eq!(StepStatus::default(), StepStatus::Pending);
    }

    #[test]
    fn test_saga_transitions() {
        assert!(SagaStatus::Pending.can_start());
        assert!(!SagaStatus::Running.can_start());
        assert!(!SagaStatus::Failed.can_start());

        assert!(SagaStatus::Running.can_finish());
        assert!(!SagaStatus::Pending.can_finish());
        assert!(!SagaStatus::Completed.can_finish());
        assert!(!SagaStatus::Failed.can_finish());

        assert!(SagaStatus::Running.accepts_steps());
        assert!(!SagaStatus::Completed.accepts_steps());
    }

    #[test]
    fn test_saga_terminal_states() {
        assert!(!SagaStatus::Pending.is_terminal());
        assert!(!SagaStatus::Running.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
    }

    #[test]
    fn test_step_transitions() {
        assert!(StepStatus::Pending.can_start());
        assert!(StepStatus::Started.can_start());
        assert!(!StepStatus::Running.can_start());
        assert!(!StepStatus::Failed.can_start());

        assert!(StepStatus::Started.can_run());
        assert!(StepStatus::Running.can_run());
        assert!(!StepStatus::Pending.can_run());
        assert!(!StepStatus::Completed.can_run());

        assert!(StepStatus::Started.can_finish());
        assert!(StepStatus::Running.can_finish());
        assert!(!StepStatus::Pending.can_finish());
        assert!(!StepStatus::Completed.can_finish());
        assert!(!StepStatus::Failed.can_finish());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaStatus::Running.to_string(), "RUNNING");
        assert_eq!(StepStatus::Completed.to_string(), "COMPLETED");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&StepStatus::Failed).unwrap();
        assert_eq!(json, "\"FAILED\"");
        let status: SagaStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(status, SagaStatus::Completed);
    }
}
