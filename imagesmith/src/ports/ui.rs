//! User-facing output sink.

use crate::state::{keys, StateBag};
use std::sync::Arc;
use tracing::{error, info};

/// Output sink for messages meant for the person running the build.
pub trait Ui: Send + Sync {
    /// Announces a new phase of work.
    fn say(&self, message: &str);

    /// Reports progress within the current phase.
    fn message(&self, message: &str);

    /// Reports an error.
    fn error(&self, message: &str);
}

/// A [`Ui`] that forwards every message to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingUi {
    prefix: Option<String>,
}

impl TracingUi {
    /// Creates a new tracing UI.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes every message, e.g. with the builder name.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn format(&self, message: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}: {message}"),
            None => message.to_string(),
        }
    }

    /// Returns the UI stored in the bag, or a tracing UI if none was stored.
    pub fn from_state(state: &StateBag) -> Arc<dyn Ui> {
        state.get(keys::UI).unwrap_or_else(|| Arc::new(Self::new()))
    }
}

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        info!(ui = "say", "==> {}", self.format(message));
    }

    fn message(&self, message: &str) {
        info!(ui = "message", "    {}", self.format(message));
    }

    fn error(&self, message: &str) {
        error!(ui = "error", "{}", self.format(message));
    }
}
