//! Runner states and run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a [`Runner`](super::Runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum RunnerState {
    /// `run` has not been called.
    NotStarted,
    /// The step at this index is executing.
    Running(usize),
    /// Every step continued.
    Completed,
    /// A step halted; cleanup has run.
    Halted,
    /// The token was cancelled; cleanup has run.
    Cancelled,
}

impl RunnerState {
    /// Returns true for `Completed`, `Halted` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Halted | Self::Cancelled)
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running(index) => write!(f, "running({index})"),
            Self::Completed => write!(f, "completed"),
            Self::Halted => write!(f, "halted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step continued.
    Completed,
    /// A step halted.
    Halted,
    /// The cancellation token fired.
    Cancelled,
}

impl RunOutcome {
    /// Returns the event type announcing this outcome.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Completed => "build.completed",
            Self::Halted => "build.halted",
            Self::Cancelled => "build.cancelled",
        }
    }

    pub(crate) const fn terminal_state(self) -> RunnerState {
        match self {
            Self::Completed => RunnerState::Completed,
            Self::Halted => RunnerState::Halted,
            Self::Cancelled => RunnerState::Cancelled,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Halted => write!(f, "halted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A cleanup that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    /// Step name.
    pub step: String,
    /// Position of the step in the build.
    pub index: usize,
    /// Error or panic message.
    pub message: String,
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Number of steps whose `run` was started.
    pub steps_run: usize,
    /// Cleanups that failed while unwinding, in the order they ran.
    pub cleanup_failures: Vec<CleanupFailure>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
    /// Total duration in milliseconds, cleanup included.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns true if every step continued.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!RunnerState::NotStarted.is_terminal());
        assert!(!RunnerState::Running(3).is_terminal());
        for outcome in [RunOutcome::Completed, RunOutcome::Halted, RunOutcome::Cancelled] {
            assert!(outcome.terminal_state().is_terminal());
        }
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(RunnerState::Running(2)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "running", "step": 2}));
        assert_eq!(RunnerState::Running(2).to_string(), "running(2)");
    }

    #[test]
    fn test_outcome_event_types() {
        assert_eq!(RunOutcome::Halted.event_type(), "build.halted");
        assert_eq!(RunOutcome::Cancelled.to_string(), "cancelled");
    }
}
