//! Subscriber initialisation for binaries and tests embedding the builder.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs a human-readable global subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter` when set. Returns
/// `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    fmt()
        .with_env_filter(env_filter(default_filter))
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Installs a global subscriber emitting one JSON object per event.
pub fn init_json_tracing(default_filter: &str) -> bool {
    fmt()
        .json()
        .with_env_filter(env_filter(default_filter))
        .with_current_span(true)
        .try_init()
        .is_ok()
}
