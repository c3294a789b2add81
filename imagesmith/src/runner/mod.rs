//! Sequential step runner.
//!
//! The runner executes steps in order until one halts, the cancellation
//! token fires, or every step has continued. On halt or cancellation it
//! calls `cleanup` on every step whose `run` was started, newest first,
//! whatever those cleanups return.

mod report;

pub use report::{CleanupFailure, RunOutcome, RunReport, RunnerState};

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::events::{get_event_sink, EventSink};
use crate::observability::{BuildSpanAttributes, SpanTimer, StepSpanAttributes};
use crate::state::{keys, StateBag};
use crate::step::{halt, Step, StepAction};

/// Runs an ordered list of steps once.
pub struct Runner {
    steps: Vec<Arc<dyn Step>>,
    state: Mutex<RunnerState>,
    event_sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(|s| s.name()).collect();
        f.debug_struct("Runner")
            .field("steps", &names)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Runner {
    /// Creates a runner reporting to the process-wide event sink.
    #[must_use]
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        Self {
            steps,
            state: Mutex::new(RunnerState::NotStarted),
            event_sink: get_event_sink(),
        }
    }

    /// Reports events to `sink` instead.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    /// Returns the step names, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    /// Runs every step against `state`.
    ///
    /// Halts and cancellation are reported through the returned
    /// [`RunReport`]; the fatal error, if any, is in the bag.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::RunnerAlreadyRan`] if called a second time.
    pub async fn run(&self, state: &StateBag, cancel: &CancellationToken) -> Result<RunReport, BuildError> {
        {
            let mut current = self.state.lock();
            if *current != RunnerState::NotStarted {
                return Err(BuildError::RunnerAlreadyRan);
            }
            *current = RunnerState::Running(0);
        }

        let build_id = Uuid::new_v4().to_string();
        let sink = Arc::clone(&self.event_sink);
        let requested = build_id.clone();
        cancel.on_cancel(move || {
            warn!(build_id = %requested, "Cancellation requested, unwinding after the current step");
            sink.try_emit(
                "build.cancel_requested",
                Some(serde_json::json!({ "build_id": requested })),
            );
        });

        let span = info_span!("build", build_id = %build_id, steps = self.steps.len());
        Ok(self.execute(state, cancel, build_id).instrument(span).await)
    }

    async fn execute(&self, state: &StateBag, cancel: &CancellationToken, build_id: String) -> RunReport {
        let started_at = Utc::now();
        let timer = SpanTimer::start();
        let mut outcome = RunOutcome::Completed;
        let mut started = 0;

        info!("Starting build");
        for (index, step) in self.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome = RunOutcome::Cancelled;
                break;
            }

            *self.state.lock() = RunnerState::Running(index);
            started = index + 1;
            let action = self.run_step(index, step.as_ref(), state, cancel).await;

            if cancel.is_cancelled() {
                outcome = RunOutcome::Cancelled;
                break;
            }
            if action == StepAction::Halt {
                outcome = RunOutcome::Halted;
                break;
            }
        }

        let cleanup_failures = match outcome {
            RunOutcome::Completed => Vec::new(),
            RunOutcome::Halted => {
                state.put(keys::HALTED, true);
                self.unwind(started, state).await
            }
            RunOutcome::Cancelled => {
                state.put(keys::CANCELLED, true);
                info!(reason = ?cancel.reason(), "Build cancelled");
                self.unwind(started, state).await
            }
        };

        *self.state.lock() = outcome.terminal_state();
        let duration_ms = timer.finish();

        let mut data = BuildSpanAttributes::new(build_id, self.steps.len())
            .with_outcome(outcome.to_string())
            .with_duration_ms(duration_ms)
            .to_event_data();
        data["steps_run"] = serde_json::json!(started);
        data["cleanup_failures"] = serde_json::json!(cleanup_failures.len());
        if let Some(err) = state.error() {
            data["error"] = serde_json::json!(err.to_dict());
        }
        self.event_sink.try_emit(outcome.event_type(), Some(data));
        info!(outcome = %outcome, steps_run = started, duration_ms, "Build finished");

        RunReport {
            outcome,
            steps_run: started,
            cleanup_failures,
            started_at,
            ended_at: Utc::now(),
            duration_ms,
        }
    }

    async fn run_step(
        &self,
        index: usize,
        step: &dyn Step,
        state: &StateBag,
        cancel: &CancellationToken,
    ) -> StepAction {
        let name = step.name().to_string();
        let span = info_span!("step", step = %name, index);

        async {
            self.event_sink.try_emit(
                "step.started",
                Some(StepSpanAttributes::new(&name, index).to_event_data()),
            );
            debug!("Running step");

            let timer = SpanTimer::start();
            let action = match AssertUnwindSafe(step.run(state, cancel)).catch_unwind().await {
                Ok(action) => action,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(panic = %message, "Step panicked");
                    halt(state, BuildError::StepPanicked { step: name.clone(), message })
                }
            };
            let duration_ms = timer.finish();

            let attrs = StepSpanAttributes::new(&name, index)
                .with_status(action.to_string())
                .with_duration_ms(duration_ms);
            match action {
                StepAction::Continue => {
                    debug!(duration_ms, "Step completed");
                    self.event_sink.try_emit("step.completed", Some(attrs.to_event_data()));
                }
                StepAction::Halt => {
                    let attrs = match state.error() {
                        Some(err) => attrs.with_error(err.to_string()),
                        None => attrs,
                    };
                    info!(duration_ms, "Step halted the build");
                    self.event_sink.try_emit("step.halted", Some(attrs.to_event_data()));
                }
            }
            action
        }
        .instrument(span)
        .await
    }

    /// Cleans up the first `started` steps in reverse order.
    async fn unwind(&self, started: usize, state: &StateBag) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();

        for (index, step) in self.steps[..started].iter().enumerate().rev() {
            let name = step.name();
            let timer = SpanTimer::start();
            let result = AssertUnwindSafe(step.cleanup(state)).catch_unwind().await;
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(format!("cleanup panicked: {}", panic_message(payload.as_ref()))),
            };

            let mut attrs = StepSpanAttributes::new(name, index).with_duration_ms(timer.finish());
            attrs = match &failure {
                Some(message) => attrs.with_status("failed").with_error(message.clone()),
                None => attrs.with_status("ok"),
            };
            self.event_sink.try_emit("step.cleanup", Some(attrs.to_event_data()));

            if let Some(message) = failure {
                warn!(step = %name, index, error = %message, "Cleanup failed");
                failures.push(CleanupFailure {
                    step: name.to_string(),
                    index,
                    message,
                });
            }
        }

        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use crate::events::CollectingEventSink;
    use crate::testing::{
        assert_call_log, assert_error_category, assert_outcome, call_log, CallLog, CancellingStep,
        PanickingStep, RecordingStep,
    };
    use pretty_assertions::assert_eq;

    fn recording(names: &[&str], log: &CallLog) -> Vec<Arc<dyn Step>> {
        names
            .iter()
            .map(|n| Arc::new(RecordingStep::new(*n, log)) as Arc<dyn Step>)
            .collect()
    }

    #[tokio::test]
    async fn test_all_steps_continue() {
        let log = call_log();
        let runner = Runner::new(recording(&["a", "b", "c"], &log));
        let state = StateBag::new();

        let report = runner.run(&state, &CancellationToken::new()).await.unwrap();

        assert_outcome(&report, RunOutcome::Completed);
        assert_eq!(report.steps_run, 3);
        assert_call_log(&log, &["run:a", "run:b", "run:c"]);
        assert_eq!(runner.state(), RunnerState::Completed);
        assert!(!state.is_set(keys::HALTED));
        assert!(state.error().is_none());
    }

    #[tokio::test]
    async fn test_halt_cleans_up_started_steps_in_reverse() {
        let log = call_log();
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::new("a", &log)),
            Arc::new(RecordingStep::new("b", &log)),
            Arc::new(RecordingStep::halting("c", &log)),
            Arc::new(RecordingStep::new("d", &log)),
        ];
        let runner = Runner::new(steps);
        let state = StateBag::new();

        let report = runner.run(&state, &CancellationToken::new()).await.unwrap();

        assert_outcome(&report, RunOutcome::Halted);
        assert_eq!(report.steps_run, 3);
        assert_call_log(
            &log,
            &["run:a", "run:b", "run:c", "cleanup:c", "cleanup:b", "cleanup:a"],
        );
        assert!(state.is_set(keys::HALTED));
        assert_error_category(&state, ErrorCategory::Internal);
        assert_eq!(runner.state(), RunnerState::Halted);
    }

    #[tokio::test]
    async fn test_halt_on_first_step_cleans_only_that_step() {
        let log = call_log();
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::halting("a", &log)),
            Arc::new(RecordingStep::new("b", &log)),
        ];
        let report = Runner::new(steps)
            .run(&StateBag::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.steps_run, 1);
        assert_call_log(&log, &["run:a", "cleanup:a"]);
    }

    #[tokio::test]
    async fn test_cancel_during_step_unwinds_even_on_continue() {
        let log = call_log();
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::new("a", &log)),
            Arc::new(CancellingStep::new("b", &log, "interrupted")),
            Arc::new(RecordingStep::new("c", &log)),
        ];
        let runner = Runner::new(steps);
        let state = StateBag::new();

        let report = runner.run(&state, &CancellationToken::new()).await.unwrap();

        assert_outcome(&report, RunOutcome::Cancelled);
        assert_call_log(&log, &["run:a", "run:b", "cleanup:b", "cleanup:a"]);
        assert!(state.is_set(keys::CANCELLED));
        assert!(!state.is_set(keys::HALTED));
    }

    #[tokio::test]
    async fn test_cancel_on_last_step_is_still_cancelled() {
        let log = call_log();
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::new("a", &log)),
            Arc::new(CancellingStep::new("b", &log, "interrupted")),
        ];
        let report = Runner::new(steps)
            .run(&StateBag::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_outcome(&report, RunOutcome::Cancelled);
        assert_call_log(&log, &["run:a", "run:b", "cleanup:b", "cleanup:a"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let log = call_log();
        let token = CancellationToken::new();
        token.cancel("shutdown");

        let state = StateBag::new();
        let report = Runner::new(recording(&["a", "b"], &log)).run(&state, &token).await.unwrap();

        assert_outcome(&report, RunOutcome::Cancelled);
        assert_eq!(report.steps_run, 0);
        assert!(log.lock().is_empty());
        assert!(state.is_set(keys::CANCELLED));
    }

    #[tokio::test]
    async fn test_no_cleanup_on_success() {
        let log = call_log();
        let steps: Vec<Arc<dyn Step>> =
            vec![Arc::new(RecordingStep::new("a", &log).with_cleanup_error("never called"))];
        let report = Runner::new(steps)
            .run(&StateBag::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_completed());
        assert!(report.cleanup_failures.is_empty());
        assert_call_log(&log, &["run:a"]);
    }

    #[tokio::test]
    async fn test_failing_cleanup_does_not_stop_unwinding() {
        let log = call_log();
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::new("a", &log)),
            Arc::new(RecordingStep::new("b", &log).with_cleanup_error("instance still busy")),
            Arc::new(PanickingStep::in_cleanup("c", &log)),
            Arc::new(RecordingStep::halting("d", &log)),
        ];
        let report = Runner::new(steps)
            .run(&StateBag::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_call_log(
            &log,
            &[
                "run:a", "run:b", "run:c", "run:d", "cleanup:d", "cleanup:c", "cleanup:b", "cleanup:a",
            ],
        );
        assert_eq!(report.cleanup_failures.len(), 2);
        assert_eq!(report.cleanup_failures[0].step, "c");
        assert!(report.cleanup_failures[0].message.contains("cleanup panicked"));
        assert_eq!(report.cleanup_failures[1].index, 1);
        assert!(report.cleanup_failures[1].message.contains("instance still busy"));
    }

    #[tokio::test]
    async fn test_panicking_step_halts() {
        let log = call_log();
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::new("a", &log)),
            Arc::new(PanickingStep::new("boom", &log)),
            Arc::new(RecordingStep::new("c", &log)),
        ];
        let state = StateBag::new();
        let report = Runner::new(steps).run(&state, &CancellationToken::new()).await.unwrap();

        assert_outcome(&report, RunOutcome::Halted);
        assert_call_log(&log, &["run:a", "run:boom", "cleanup:boom", "cleanup:a"]);
        let err = state.error().unwrap();
        assert!(matches!(*err, BuildError::StepPanicked { ref step, .. } if step == "boom"));
        assert!(err.to_string().contains("boom exploded"));
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let runner = Runner::new(Vec::new());
        let token = CancellationToken::new();
        runner.run(&StateBag::new(), &token).await.unwrap();

        let err = runner.run(&StateBag::new(), &token).await.unwrap_err();
        assert!(matches!(err, BuildError::RunnerAlreadyRan));
    }

    #[tokio::test]
    async fn test_events_follow_step_lifecycle() {
        let log = call_log();
        let sink = Arc::new(CollectingEventSink::new());
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::new("a", &log)),
            Arc::new(RecordingStep::halting("b", &log)),
        ];
        Runner::new(steps)
            .with_event_sink(sink.clone())
            .run(&StateBag::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            sink.event_types(),
            vec![
                "step.started",
                "step.completed",
                "step.started",
                "step.halted",
                "step.cleanup",
                "step.cleanup",
                "build.halted",
            ]
        );
        let (_, data) = &sink.events_of_type("step.halted")[0];
        let data = data.as_ref().unwrap();
        assert_eq!(data["step"], "b");
        assert_eq!(data["error"], "internal error: b halted");
    }

    #[tokio::test]
    async fn test_cancel_request_is_reported_once_for_the_build() {
        let log = call_log();
        let sink = Arc::new(CollectingEventSink::new());
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(RecordingStep::new("a", &log)),
            Arc::new(CancellingStep::new("b", &log, "user interrupt")),
            Arc::new(RecordingStep::new("c", &log)),
        ];
        let report = Runner::new(steps)
            .with_event_sink(sink.clone())
            .run(&StateBag::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_outcome(&report, RunOutcome::Cancelled);
        let requested = sink.events_of_type("build.cancel_requested");
        assert_eq!(requested.len(), 1);
        let (_, finished) = &sink.events_of_type("build.cancelled")[0];
        assert_eq!(
            requested[0].1.as_ref().unwrap()["build_id"],
            finished.as_ref().unwrap()["build_id"]
        );

        let types = sink.event_types();
        let requested_at = types.iter().position(|t| t == "build.cancel_requested").unwrap();
        let cleanup_at = types.iter().position(|t| t == "step.cleanup").unwrap();
        assert!(requested_at < cleanup_at);
    }

    #[test]
    fn test_debug_lists_step_names() {
        let log = call_log();
        let runner = Runner::new(recording(&["a", "b"], &log));
        assert_eq!(runner.step_names(), vec!["a", "b"]);
        assert!(format!("{runner:?}").contains("NotStarted"));
    }
}
