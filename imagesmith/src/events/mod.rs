//! Build lifecycle events.
//!
//! The runner reports every step transition to an [`EventSink`]. Unless a
//! sink is passed explicitly, the process-wide sink set with
//! [`set_event_sink`] is used.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-wide event sink.
///
/// Returns a `NoOpEventSink` if no sink is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_sink_roundtrip() {
        let sink = Arc::new(CollectingEventSink::new());
        set_event_sink(sink.clone());
        get_event_sink().try_emit("build.started", None);
        clear_event_sink();
        get_event_sink().try_emit("build.ignored", None);

        let types = sink.event_types();
        assert!(types.iter().any(|t| t == "build.started"));
        assert!(!types.iter().any(|t| t == "build.ignored"));
    }
}
