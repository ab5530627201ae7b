//! Bridge from `tracing` into the [`LogSink`].
//!
//! The server core reports its own diagnostics (listening address, accept and
//! connection errors, shutdown progress) through `tracing` macros. This layer
//! turns each of those events into a [`LogEvent`] so they reach the same
//! console and files as application events.

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::event::LogEvent;
use super::level::Level;
use super::sink::LogSink;

pub struct SinkLayer {
    sink: Arc<LogSink>,
}

impl SinkLayer {
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        !metadata.is_event() || self.sink.enabled(Level::from(metadata.level()))
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = Level::from(metadata.level());
        if !self.sink.enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        visitor.fields.insert("target".into(), Value::String(metadata.target().to_owned()));

        self.sink.emit(
            LogEvent::new(level, visitor.message.unwrap_or_default()).with_fields(visitor.fields),
        );
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_owned(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut text = String::new();
        let _ = write!(text, "{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.put(field, Value::String(text));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.put(field, Value::String(value.to_owned()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.put(field, Value::Number(n));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::log::MemoryTransport;

    #[test]
    fn forwards_tracing_events_with_fields() {
        let memory = MemoryTransport::new(Level::Debug);
        let sink = Arc::new(
            LogSink::builder()
                .level(Level::Info)
                .default_field("service", "svc")
                .transport(Arc::new(memory.clone()))
                .build(),
        );
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(sink));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(addr = "127.0.0.1:3000", in_flight = 3u64, "listening");
            tracing::debug!("below floor");
            tracing::error!(peer = %"10.0.0.1", "connection error: reset");
        });

        let events = memory.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "listening");
        assert_eq!(events[0].field("addr").unwrap(), "127.0.0.1:3000");
        assert_eq!(events[0].field("in_flight").unwrap(), 3);
        assert_eq!(events[0].field("service").unwrap(), "svc");
        assert_eq!(events[1].level, Level::Error);
        assert_eq!(events[1].field("peer").unwrap(), "10.0.0.1");
    }
}
