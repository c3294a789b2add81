//! Step trait and helpers.
//!
//! Steps are the units of work a build is made of. Each step is a flat
//! implementation of the same two-operation contract and communicates with
//! other steps only through the [`StateBag`].

use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::ports::TracingUi;
use crate::state::StateBag;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use tracing::error;

/// What the runner should do after a step's `run` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Proceed with the next step.
    Continue,
    /// Stop the build and unwind.
    Halt,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Halt => write!(f, "halt"),
        }
    }
}

/// Trait for build steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step, for logs and events.
    fn name(&self) -> &str;

    /// Performs the step's work.
    ///
    /// Reads what it needs from `state` and writes what it produces back.
    /// On failure the step records the error with [`halt`] and returns
    /// [`StepAction::Halt`]. `cancel` is checked at natural boundaries.
    async fn run(&self, state: &StateBag, cancel: &CancellationToken) -> StepAction;

    /// Reverses any externally visible effect of `run`.
    ///
    /// Called only when the build halts or is cancelled, in reverse order
    /// of execution. Must be idempotent; an error is reported by the runner
    /// but never stops the remaining cleanups.
    async fn cleanup(&self, _state: &StateBag) -> Result<(), BuildError> {
        Ok(())
    }
}

/// Records `error` as the build's fatal error, reports it, and returns
/// [`StepAction::Halt`].
pub fn halt(state: &StateBag, error: BuildError) -> StepAction {
    let ui = TracingUi::from_state(state);
    error!(category = %error.category(), "{}", error);
    ui.error(&error.to_string());
    state.put_error(error);
    StepAction::Halt
}

/// Halts with a cancellation error if `cancel` has fired.
pub fn halt_if_cancelled(state: &StateBag, cancel: &CancellationToken) -> Option<StepAction> {
    cancel.is_cancelled().then(|| {
        halt(
            state,
            BuildError::Cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string())),
        )
    })
}

/// A simple function-based step with no cleanup.
pub struct FnStep<F>
where
    F: Fn(&StateBag) -> StepAction + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StateBag) -> StepAction + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&StateBag) -> StepAction + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&StateBag) -> StepAction + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateBag, _cancel: &CancellationToken) -> StepAction {
        (self.func)(state)
    }
}
