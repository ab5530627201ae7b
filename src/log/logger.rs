//! Logger handles.
//!
//! A [`Logger`] is a cheap clone of a shared [`LogSink`] plus a set of bound
//! fields. [`Logger::child`] returns a new handle whose bound fields are a
//! superset of the parent's; every event it emits carries them.
//!
//! ```rust,no_run
//! # use waypost::log::{Logger, LogSink};
//! # use std::sync::Arc;
//! # use serde_json::json;
//! let root = Logger::new(Arc::new(LogSink::builder().build()));
//! let request = root.child_from(json!({ "requestId": "1f0c…", "method": "GET" }));
//! request.info("Fetching users");
//! request.info_with("Incoming request", json!({ "query": {} }));
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use super::event::LogEvent;
use super::level::Level;
use super::sink::{Fatal, LogSink};

#[derive(Clone)]
pub struct Logger {
    sink: Arc<LogSink>,
    bound: Arc<Map<String, Value>>,
}

macro_rules! level_methods {
    ($($level:ident => $plain:ident, $with:ident;)*) => {$(
        pub fn $plain(&self, message: impl Into<String>) {
            self.log(Level::$level, message, Map::new());
        }

        pub fn $with(&self, message: impl Into<String>, meta: Value) {
            self.log(Level::$level, message, into_map(meta));
        }
    )*};
}

impl Logger {
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self { sink, bound: Arc::new(Map::new()) }
    }

    /// A logger that adds `fields` to everything it emits. Child fields win
    /// over the parent's on key collisions.
    pub fn child(&self, fields: Map<String, Value>) -> Self {
        let mut bound = (*self.bound).clone();
        bound.extend(fields);
        Self { sink: Arc::clone(&self.sink), bound: Arc::new(bound) }
    }

    /// [`child`](Self::child) from a JSON object literal.
    pub fn child_from(&self, fields: Value) -> Self {
        self.child(into_map(fields))
    }

    pub fn bound(&self) -> &Map<String, Value> {
        &self.bound
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.sink.enabled(level)
    }

    pub fn log(&self, level: Level, message: impl Into<String>, meta: Map<String, Value>) {
        if !self.sink.enabled(level) {
            return;
        }
        self.sink.emit(self.event(level, message, meta));
    }

    /// Write a process-fatal event to the fatal handlers.
    pub fn fatal(&self, kind: Fatal, message: impl Into<String>, meta: Value) {
        self.sink.emit_fatal(kind, self.event(Level::Error, message, into_map(meta)));
    }

    level_methods! {
        Error => error, error_with;
        Warn  => warn,  warn_with;
        Info  => info,  info_with;
        Http  => http,  http_with;
        Debug => debug, debug_with;
    }

    /// Start a wall-clock measurement finished by [`Profiler::done`].
    pub fn start_timer(&self) -> Profiler {
        Profiler { logger: self.clone(), started: Instant::now() }
    }

    fn event(&self, level: Level, message: impl Into<String>, meta: Map<String, Value>) -> LogEvent {
        let mut fields = (*self.bound).clone();
        fields.extend(meta);
        LogEvent::new(level, message).with_fields(fields)
    }
}

/// Non-object metadata is kept under a `meta` key.
fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("meta".into(), other);
            map
        }
    }
}

/// A running timer from [`Logger::start_timer`].
pub struct Profiler {
    logger: Logger,
    started: Instant,
}

impl Profiler {
    /// Log `message` at `level` with the elapsed time as `durationMs`.
    pub fn done(self, level: Level, message: impl Into<String>) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        let mut meta = Map::new();
        meta.insert("durationMs".into(), elapsed.into());
        self.logger.log(level, message, meta);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::log::MemoryTransport;

    fn capture(level: Level) -> (Logger, MemoryTransport) {
        let memory = MemoryTransport::new(Level::Debug);
        let sink = LogSink::builder()
            .level(level)
            .default_field("service", "test-svc")
            .transport(Arc::new(memory.clone()))
            .build();
        (Logger::new(Arc::new(sink)), memory)
    }

    #[test]
    fn child_fields_ride_on_every_event() {
        let (root, memory) = capture(Level::Debug);
        let child = root.child_from(json!({ "requestId": "r-1", "method": "GET" }));

        child.info("first");
        child.warn_with("second", json!({ "extra": true }));
        root.info("unbound");

        let events = memory.events();
        assert_eq!(events[0].field("requestId").unwrap(), "r-1");
        assert_eq!(events[1].field("method").unwrap(), "GET");
        assert_eq!(events[1].field("extra").unwrap(), true);
        assert_eq!(events[1].field("service").unwrap(), "test-svc");
        assert!(events[2].field("requestId").is_none());
    }

    #[test]
    fn grandchild_overrides_parent_fields() {
        let (root, memory) = capture(Level::Debug);
        let child = root.child_from(json!({ "a": 1, "b": 1 }));
        let grandchild = child.child_from(json!({ "b": 2 }));

        grandchild.debug("x");

        let event = &memory.events()[0];
        assert_eq!(event.field("a").unwrap(), 1);
        assert_eq!(event.field("b").unwrap(), 2);
    }

    #[test]
    fn below_floor_is_dropped() {
        let (root, memory) = capture(Level::Warn);
        root.info("dropped");
        root.http("dropped");
        root.error("kept");
        assert_eq!(memory.messages(), vec!["kept"]);
    }

    #[test]
    fn non_object_metadata_is_wrapped() {
        let (root, memory) = capture(Level::Debug);
        root.info_with("scalar", json!(42));
        assert_eq!(memory.events()[0].field("meta").unwrap(), 42);
    }

    #[test]
    fn profiler_reports_duration() {
        let (root, memory) = capture(Level::Debug);
        let timer = root.start_timer();
        std::thread::sleep(std::time::Duration::from_millis(5));
        timer.done(Level::Info, "Profile test completed");

        let event = &memory.events()[0];
        assert_eq!(event.message, "Profile test completed");
        assert!(event.field("durationMs").unwrap().as_u64().unwrap() >= 5);
    }
}
