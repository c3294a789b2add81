//! Mock steps for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::state::StateBag;
use crate::step::{halt, Step, StepAction};

/// Shared, ordered log of `run:<name>` and `cleanup:<name>` entries.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty call log.
#[must_use]
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A step that records its calls and returns a fixed action.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    log: CallLog,
    action: StepAction,
    cleanup_error: Option<String>,
}

impl RecordingStep {
    /// Creates a step that continues.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: Arc::clone(log),
            action: StepAction::Continue,
            cleanup_error: None,
        }
    }

    /// Creates a step that records an internal error and halts.
    #[must_use]
    pub fn halting(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            action: StepAction::Halt,
            ..Self::new(name, log)
        }
    }

    /// Makes the step's cleanup fail with `message`.
    #[must_use]
    pub fn with_cleanup_error(mut self, message: impl Into<String>) -> Self {
        self.cleanup_error = Some(message.into());
        self
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateBag, _cancel: &CancellationToken) -> StepAction {
        self.log.lock().push(format!("run:{}", self.name));
        match self.action {
            StepAction::Continue => StepAction::Continue,
            StepAction::Halt => halt(state, BuildError::Internal(format!("{} halted", self.name))),
        }
    }

    async fn cleanup(&self, _state: &StateBag) -> Result<(), BuildError> {
        self.log.lock().push(format!("cleanup:{}", self.name));
        match &self.cleanup_error {
            Some(message) => Err(BuildError::Internal(message.clone())),
            None => Ok(()),
        }
    }
}

/// A step that cancels the build's token while running.
#[derive(Debug)]
pub struct CancellingStep {
    name: String,
    log: CallLog,
    reason: String,
}

impl CancellingStep {
    /// Creates a cancelling step.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: Arc::clone(log),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Step for CancellingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _state: &StateBag, cancel: &CancellationToken) -> StepAction {
        self.log.lock().push(format!("run:{}", self.name));
        cancel.cancel(self.reason.clone());
        StepAction::Continue
    }

    async fn cleanup(&self, _state: &StateBag) -> Result<(), BuildError> {
        self.log.lock().push(format!("cleanup:{}", self.name));
        Ok(())
    }
}

/// A step that panics in `run`, or in `cleanup` only.
#[derive(Debug)]
pub struct PanickingStep {
    name: String,
    log: CallLog,
    in_cleanup: bool,
}

impl PanickingStep {
    /// Creates a step whose `run` panics.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: Arc::clone(log),
            in_cleanup: false,
        }
    }

    /// Creates a step whose `run` continues and whose `cleanup` panics.
    #[must_use]
    pub fn in_cleanup(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            in_cleanup: true,
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl Step for PanickingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _state: &StateBag, _cancel: &CancellationToken) -> StepAction {
        self.log.lock().push(format!("run:{}", self.name));
        if !self.in_cleanup {
            panic!("{} exploded", self.name);
        }
        StepAction::Continue
    }

    async fn cleanup(&self, _state: &StateBag) -> Result<(), BuildError> {
        self.log.lock().push(format!("cleanup:{}", self.name));
        if self.in_cleanup {
            panic!("{} cleanup exploded", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_step_logs_calls() {
        let log = call_log();
        let step = RecordingStep::new("a", &log).with_cleanup_error("gone");
        let bag = StateBag::new();

        assert_eq!(step.run(&bag, &CancellationToken::new()).await, StepAction::Continue);
        assert!(step.cleanup(&bag).await.is_err());
        assert_eq!(*log.lock(), vec!["run:a", "cleanup:a"]);
    }

    #[tokio::test]
    async fn test_halting_step_records_error() {
        let log = call_log();
        let bag = StateBag::new();
        let action = RecordingStep::halting("b", &log)
            .run(&bag, &CancellationToken::new())
            .await;
        assert_eq!(action, StepAction::Halt);
        assert!(bag.error().is_some());
    }

    #[tokio::test]
    async fn test_cancelling_step_cancels_token() {
        let log = call_log();
        let token = CancellationToken::new();
        CancellingStep::new("c", &log, "user abort")
            .run(&StateBag::new(), &token)
            .await;
        assert_eq!(token.reason().as_deref(), Some("user abort"));
    }
}
