//! Capture of `tracing` events for assertions on what got logged.

use std::{collections::BTreeMap, fmt, sync::Arc};

use observability_deps::tracing::{
    self,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
    subscriber::{DefaultGuard, Subscriber},
    Event, Level, Metadata,
};
use parking_lot::Mutex;

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Event target, usually the module path.
    pub target: String,
    /// The `message` field, empty if there is none.
    pub message: String,
    /// Every other field, rendered with `Display` (or `Debug` for `?field`).
    pub fields: BTreeMap<String, String>,
}

impl fmt::Display for CapturedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level = {}; message = {}; ", self.level, self.message)?;
        for (k, v) in &self.fields {
            write!(f, "{k} = {v}; ")?;
        }
        Ok(())
    }
}

type SharedEvents = Arc<Mutex<Vec<CapturedEvent>>>;

/// Records every `tracing` event emitted on the threads it is registered in.
///
/// [`TracingCapture::new`] registers the capture as the default subscriber of the current thread;
/// it is unregistered on drop. Use a current-thread runtime for async tests so spawned tasks are
/// captured too.
#[derive(Debug)]
pub struct TracingCapture {
    events: SharedEvents,
    guards: Mutex<Vec<DefaultGuard>>,
}

impl TracingCapture {
    /// Create a capture and register it in the current thread.
    #[expect(clippy::new_without_default)]
    #[must_use]
    pub fn new() -> Self {
        let capture = Self {
            events: Default::default(),
            guards: Default::default(),
        };
        capture.register_in_current_thread();
        capture
    }

    /// Register the capture as the default subscriber of the current thread as well.
    pub fn register_in_current_thread(&self) {
        let subscriber = CaptureSubscriber {
            events: Arc::clone(&self.events),
        };
        let guard = tracing::subscriber::set_default(subscriber);
        self.guards.lock().push(guard);
    }

    /// Every event captured so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Captured events at exactly `level`.
    pub fn events_at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Whether an event at `level` has a message containing `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

impl fmt::Display for TracingCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, event) in self.events.lock().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{event}")?;
        }
        Ok(())
    }
}

struct CaptureSubscriber {
    events: SharedEvents,
}

impl Subscriber for CaptureSubscriber {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.events.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

#[derive(Debug, Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use observability_deps::tracing::{error, info, warn};

    use super::*;

    #[test]
    fn test_capture() {
        let capture = TracingCapture::new();

        info!(database = "telegraf", bytes = 42_u64, "request done");
        warn!(flag = true, "careful");
        error!(error = %"boom", "request failed");

        let events = capture.events();
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].level, Level::INFO);
        assert_eq!(events[0].message, "request done");
        assert_eq!(events[0].fields["database"], "telegraf");
        assert_eq!(events[0].fields["bytes"], "42");
        assert_eq!(events[1].fields["flag"], "true");

        assert!(capture.contains(Level::ERROR, "failed"));
        assert!(!capture.contains(Level::INFO, "failed"));
        assert_eq!(capture.events_at(Level::WARN).len(), 1);

        assert_eq!(
            capture.to_string().lines().next().unwrap(),
            "level = INFO; message = request done; bytes = 42; database = telegraf; "
        );
    }
}
