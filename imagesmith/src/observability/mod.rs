//! Observability utilities.

mod subscriber;
mod tracing;

pub use subscriber::{init_json_tracing, init_tracing};
pub use tracing::{BuildSpanAttributes, SpanTimer, StepSpanAttributes};
