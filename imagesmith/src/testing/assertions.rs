//! Test assertions for runner reports and state bags.

use crate::errors::ErrorCategory;
use crate::runner::{RunOutcome, RunReport};
use crate::state::StateBag;

use super::mocks::CallLog;

/// Asserts that the run ended with the expected outcome.
pub fn assert_outcome(report: &RunReport, expected: RunOutcome) {
    assert_eq!(
        report.outcome, expected,
        "Expected outcome {:?}, got {:?} after {} step(s)",
        expected, report.outcome, report.steps_run
    );
}

/// Asserts that the bag holds an error of the given category.
pub fn assert_error_category(state: &StateBag, expected: ErrorCategory) {
    let error = state.error();
    assert!(error.is_some(), "Expected an error in the state bag, found none");
    if let Some(error) = error {
        assert_eq!(
            error.category(),
            expected,
            "Expected {} error, got {}: {}",
            expected,
            error.category(),
            error
        );
    }
}

/// Asserts the exact sequence of recorded step calls.
pub fn assert_call_log(log: &CallLog, expected: &[&str]) {
    let actual = log.lock().clone();
    assert_eq!(actual, expected, "Unexpected step call order");
}
