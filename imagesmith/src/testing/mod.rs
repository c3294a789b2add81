//! Testing utilities for image builds.
//!
//! This module provides:
//! - Mock steps that record run and cleanup order
//! - An in-memory cloud driver with failure injection
//! - A collecting UI and a recording provisioner
//! - Fixtures and assertions for runner reports and state bags

mod assertions;
mod doubles;
mod fixtures;
mod mocks;

pub use assertions::{assert_call_log, assert_error_category, assert_outcome};
pub use doubles::{CollectingUi, InMemoryDriver, RecordingProvisioner, UiLevel};
pub use fixtures::TestBuild;
pub use mocks::{call_log, CallLog, CancellingStep, PanickingStep, RecordingStep};
