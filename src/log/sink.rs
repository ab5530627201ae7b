//! Process-wide fan-out of log events to transports.
//!
//! A [`LogSink`] is built once at startup, shared behind an `Arc`, and flushed
//! at shutdown. It owns two kinds of destination:
//!
//! | Kind | Receives | Reference layout |
//! |---|---|---|
//! | transports | every event at or above the sink floor and the transport floor | console, `combined-*.log`, `error-*.log` |
//! | fatal handlers | only process-fatal events, regardless of floors | `exceptions.log` / `rejections.log` + console |
//!
//! Each transport serializes its own writes; the sink itself holds no lock.

use std::io;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::{Mode, Settings};
use crate::error::Error;

use super::console::{ConsoleTransport, Format};
use super::event::LogEvent;
use super::file::FileTransport;
use super::level::Level;
use super::rotate::{RotatingFile, RotationPolicy};

/// A destination for log events.
pub trait Transport: Send + Sync {
    /// Short name used when reporting write failures.
    fn name(&self) -> &str;

    /// Least severe level this transport accepts.
    fn min_level(&self) -> Level;

    /// Write one event. Implementations must not interleave partial records.
    fn log(&self, event: &LogEvent) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Remove expired output. Only rotating transports have any.
    fn sweep(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Which class of process-fatal fault an event describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fatal {
    /// A panic that escaped every request-scoped handler.
    Exception,
    /// A background task that finished with an error nobody awaited.
    Rejection,
}

pub struct LogSink {
    level: Level,
    defaults: Map<String, Value>,
    transports: Vec<Arc<dyn Transport>>,
    exception_handlers: Vec<Arc<dyn Transport>>,
    rejection_handlers: Vec<Arc<dyn Transport>>,
}

impl LogSink {
    pub fn builder() -> LogSinkBuilder {
        LogSinkBuilder::default()
    }

    /// The reference layout under `settings.log_dir`:
    ///
    /// - console (pretty in development, JSON in production)
    /// - `combined-YYYY-MM-DD.log`, every level, 20 MB per file, 14 days
    /// - `error-YYYY-MM-DD.log`, errors only, 20 MB per file, 30 days
    /// - `exceptions.log` and `rejections.log`, unrotated, fatal events only
    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        const MB: u64 = 1024 * 1024;

        let dir = &settings.log_dir;
        std::fs::create_dir_all(dir)?;

        let console: Arc<dyn Transport> = Arc::new(ConsoleTransport::stdout(match settings.mode {
            Mode::Development => Format::Pretty,
            Mode::Production  => Format::Json,
        }));

        let combined = RotatingFile::open(dir, "combined", Level::Debug, RotationPolicy {
            max_size_bytes: 20 * MB,
            max_age_days: 14,
        })?;
        let errors = RotatingFile::open(dir, "error", Level::Error, RotationPolicy {
            max_size_bytes: 20 * MB,
            max_age_days: 30,
        })?;

        let exceptions = FileTransport::open(dir.join("exceptions.log"))?;
        let rejections = FileTransport::open(dir.join("rejections.log"))?;

        Ok(Self::builder()
            .level(settings.log_level)
            .default_field("environment", settings.mode.as_str())
            .default_field("service", settings.service_name.as_str())
            .transport(Arc::clone(&console))
            .transport(Arc::new(combined))
            .transport(Arc::new(errors))
            .exception_handler(Arc::new(exceptions))
            .exception_handler(Arc::clone(&console))
            .rejection_handler(Arc::new(rejections))
            .rejection_handler(console)
            .build())
    }

    /// Global floor, applied before any per-transport floor.
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.level.admits(level)
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Route `event` to every transport whose floor admits it.
    ///
    /// Logging never fails the caller: a transport write error is reported on
    /// stderr and the remaining transports still receive the event.
    pub fn emit(&self, event: LogEvent) {
        if !self.enabled(event.level) {
            return;
        }
        let event = self.with_defaults(event);
        for transport in &self.transports {
            if transport.min_level().admits(event.level) {
                write_or_report(transport.as_ref(), &event);
            }
        }
    }

    /// Route a process-fatal event to the matching handlers. Floors do not apply.
    pub fn emit_fatal(&self, kind: Fatal, event: LogEvent) {
        let event = self.with_defaults(event);
        let handlers = match kind {
            Fatal::Exception => &self.exception_handlers,
            Fatal::Rejection => &self.rejection_handlers,
        };
        for handler in handlers {
            write_or_report(handler.as_ref(), &event);
        }
    }

    /// Flush every transport and fatal handler.
    pub fn flush(&self) {
        for transport in self.all() {
            if let Err(e) = transport.flush() {
                eprintln!("waypost: flushing transport `{}` failed: {e}", transport.name());
            }
        }
    }

    /// Apply every transport's retention policy.
    pub fn sweep(&self) -> io::Result<()> {
        for transport in &self.transports {
            transport.sweep()?;
        }
        Ok(())
    }

    fn all(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.transports
            .iter()
            .chain(&self.exception_handlers)
            .chain(&self.rejection_handlers)
    }

    fn with_defaults(&self, mut event: LogEvent) -> LogEvent {
        if self.defaults.is_empty() {
            return event;
        }
        let mut fields = self.defaults.clone();
        fields.extend(std::mem::take(&mut event.fields));
        event.fields = fields;
        event
    }
}

fn write_or_report(transport: &dyn Transport, event: &LogEvent) {
    if let Err(e) = transport.log(event) {
        eprintln!("waypost: transport `{}` dropped an event: {e}", transport.name());
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Assembles a [`LogSink`]. Defaults to an `info` floor and no destinations.
pub struct LogSinkBuilder {
    level: Level,
    defaults: Map<String, Value>,
    transports: Vec<Arc<dyn Transport>>,
    exception_handlers: Vec<Arc<dyn Transport>>,
    rejection_handlers: Vec<Arc<dyn Transport>>,
}

impl Default for LogSinkBuilder {
    fn default() -> Self {
        Self {
            level: Level::Info,
            defaults: Map::new(),
            transports: Vec::new(),
            exception_handlers: Vec::new(),
            rejection_handlers: Vec::new(),
        }
    }
}

impl LogSinkBuilder {
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn default_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.to_owned(), value.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn exception_handler(mut self, transport: Arc<dyn Transport>) -> Self {
        self.exception_handlers.push(transport);
        self
    }

    pub fn rejection_handler(mut self, transport: Arc<dyn Transport>) -> Self {
        self.rejection_handlers.push(transport);
        self
    }

    pub fn build(self) -> LogSink {
        LogSink {
            level: self.level,
            defaults: self.defaults,
            transports: self.transports,
            exception_handlers: self.exception_handlers,
            rejection_handlers: self.rejection_handlers,
        }
    }
}
