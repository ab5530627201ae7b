//! # waypost
//!
//! Request-scoped structured logging and error normalization for a small
//! HTTP service.
//!
//! ## What every request gets
//!
//! - A random correlation id and a child logger carrying `requestId`,
//!   `method`, `url`, `ip` and `userAgent` on every event it writes.
//! - An "Incoming request" event on arrival, an "Outgoing response" event
//!   when a JSON body is emitted, and a warning for any status ≥ 400.
//! - One access-log event when the response has been sent: a readable line
//!   in development, a structured record in production.
//! - Uniform failure handling. A handler's `Err`, a handler panic, an
//!   unmatched route or an unreadable body is logged once with the request
//!   snapshot and answered with
//!   `{"error":{"message","requestId","stack"?},"timestamp"}`.
//!
//! ## Where events go
//!
//! A [`log::LogSink`] fans each event out to its transports: the console
//! (colored lines in development, JSON in production), `combined-*.log` and
//! `error-*.log` with independent size and age limits, and `exceptions.log` /
//! `rejections.log` for process-fatal faults.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use waypost::{Server, Settings, Telemetry, app, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let settings = Settings::from_env()?;
//!     let telemetry = Telemetry::init(&settings)?;
//!     let pipeline = app::build(&settings, telemetry.logger().clone(), Instant::now());
//!
//!     Server::bind(&settings.host, settings.port)
//!         .await?
//!         .serve_with_shutdown(Arc::new(pipeline), shutdown_signal())
//!         .await;
//!     Ok(())
//! }
//! ```

mod body;
mod error;
mod fatal;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod app;
pub mod config;
pub mod health;
pub mod log;
pub mod middleware;
pub mod routes;
pub mod telemetry;

pub use body::CompletionBody;
pub use config::{ConfigError, Mode, Settings};
pub use error::{AppError, Error};
pub use fatal::{install_panic_hook, spawn_background, terminate};
pub use handler::Handler;
pub use request::{Incoming, Request};
pub use response::{Completed, IntoResponse, Respond, Response, ResponseBuilder};
pub use router::Router;
pub use server::{BODY_LIMIT, Server, shutdown_signal};
pub use telemetry::Telemetry;
