//! Process-wide logging lifecycle.
//!
//! [`Telemetry::init`] runs once at startup: it builds the [`LogSink`] from
//! settings, routes `tracing` events into it, and installs the panic hook.
//! Dropping the returned handle (or calling [`Telemetry::shutdown`]) flushes
//! every transport. Fatal paths flush through [`crate::terminate`] instead,
//! since they never unwind back to `main`.
//!
//! ```rust,no_run
//! # fn main() -> Result<(), waypost::Error> {
//! let settings = waypost::Settings::from_env()?;
//! let telemetry = waypost::Telemetry::init(&settings)?;
//! telemetry.logger().info("ready");
//! telemetry.shutdown();
//! # Ok(())
//! # }
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;

use crate::config::Settings;
use crate::error::Error;
use crate::fatal;
use crate::log::{LogSink, Logger, SinkLayer};

/// How often expired log files are pruned.
pub const RETENTION_PERIOD: Duration = Duration::from_secs(60 * 60);

pub struct Telemetry {
    logger: Logger,
}

impl Telemetry {
    pub fn init(settings: &Settings) -> Result<Self, Error> {
        let sink = LogSink::from_settings(settings)?;
        Ok(Self::install(Arc::new(sink)))
    }

    /// Make `sink` the process-wide destination.
    ///
    /// If a global `tracing` subscriber is already set, it is left in place
    /// and only the application logger uses `sink`.
    pub fn install(sink: Arc<LogSink>) -> Self {
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(Arc::clone(&sink)));
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("waypost: a tracing subscriber is already installed; keeping it");
        }

        let logger = Logger::new(sink);
        fatal::install_panic_hook(logger.clone());
        Self { logger }
    }

    /// The root logger. Request loggers are its children.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Flush and release the sink.
    pub fn shutdown(self) {}
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        self.logger.sink().flush();
    }
}

/// Prune expired rotated files every `period`, forever.
///
/// Meant to run under [`crate::spawn_background`]: a sweep that fails is a
/// fatal background fault.
pub async fn retention_sweeper(sink: Arc<LogSink>, period: Duration) -> io::Result<()> {
    let mut tick = tokio::time::interval(period);
    loop {
        tick.tick().await;
        let sink = Arc::clone(&sink);
        tokio::task::spawn_blocking(move || sink.sweep())
            .await
            .map_err(io::Error::other)??;
    }
}
