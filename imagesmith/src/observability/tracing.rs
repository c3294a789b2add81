//! Span attributes and timing for builds and steps.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Attributes describing one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSpanAttributes {
    /// Unique ID of the build run.
    pub build_id: String,
    /// Number of steps in the build.
    pub step_count: usize,
    /// Final outcome, once known.
    pub outcome: Option<String>,
    /// Total duration in milliseconds.
    pub duration_ms: Option<f64>,
}

impl BuildSpanAttributes {
    /// Creates attributes for a build.
    #[must_use]
    pub fn new(build_id: impl Into<String>, step_count: usize) -> Self {
        Self {
            build_id: build_id.into(),
            step_count,
            ..Default::default()
        }
    }

    /// Sets the outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Converts to event data.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Attributes describing one step execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSpanAttributes {
    /// Step name.
    pub step: String,
    /// Position in the build.
    pub index: usize,
    /// Step action or cleanup status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StepSpanAttributes {
    /// Creates new step span attributes.
    #[must_use]
    pub fn new(step: impl Into<String>, index: usize) -> Self {
        Self {
            step: step.into(),
            index,
            ..Default::default()
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Converts to event data.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
