//! Error types.
//!
//! Two families, kept apart on purpose:
//!
//! - [`Error`]: infrastructure failures outside any request (configuration,
//!   I/O while setting up logging, binding the listener). These are fatal.
//! - [`AppError`]: a failure inside request handling. Handlers return it with
//!   `?`; the error normalizer turns it into a logged, uniform JSON response.

use std::any::Any;
use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

use http::StatusCode;

use crate::config::ConfigError;

/// The error type returned by waypost's fallible setup operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no address found for {0}")]
    Resolve(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr: addr.to_string(), source }
    }
}

// ── AppError ──────────────────────────────────────────────────────────────────

/// A request-scoped failure.
///
/// Carries everything the normalizer needs: a message safe to show the
/// client, a category name, a diagnostic trace, and optionally an HTTP status
/// and an *operational* flag (an anticipated condition such as "not found",
/// as opposed to an unexpected fault). Unset status means 500; unset flag
/// means not operational.
///
/// Any `std::error::Error` converts into an `AppError`, so `?` works on
/// ordinary fallible calls inside handlers:
///
/// ```rust,ignore
/// async fn load(req: Request) -> Result<Response, AppError> {
///     let user: User = serde_json::from_slice(req.body())?;   // → 500, name "Error"
///     Err(AppError::new("quota exceeded").with_status(StatusCode::TOO_MANY_REQUESTS))
/// }
/// ```
pub struct AppError {
    name: Cow<'static, str>,
    message: String,
    stack: Option<String>,
    status: Option<StatusCode>,
    operational: Option<bool>,
}

impl AppError {
    /// A plain error named `"Error"`, with a trace captured here.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    pub fn named(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        let stack = Some(format!("{name}: {message}\n{}", Backtrace::force_capture()));
        Self { name, message, stack, status: None, operational: None }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn operational(mut self, operational: bool) -> Self {
        self.operational = Some(operational);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn is_operational(&self) -> Option<bool> {
        self.operational
    }

    /// Convert a caught panic payload. `trace` is the panic location and
    /// backtrace recorded by the panic hook, when one was installed.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>, trace: Option<String>) -> Self {
        let message = panic_message(payload.as_ref());
        let stack = trace.unwrap_or_else(|| format!("Panic: {message}"));
        Self {
            name: Cow::Borrowed("Panic"),
            message,
            stack: Some(stack),
            status: None,
            operational: None,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_owned()
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("status", &self.status)
            .field("operational", &self.operational)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// `AppError` deliberately does not implement `std::error::Error`; that is
/// what lets this blanket conversion coexist with `From<T> for T`.
impl<E> From<E> for AppError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        let type_name = std::any::type_name::<E>();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        Self::named(short.to_owned(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_error_has_no_status_or_flag() {
        let e = AppError::new("This is a test error");
        assert_eq!(e.name(), "Error");
        assert_eq!(e.message(), "This is a test error");
        assert_eq!(e.status(), None);
        assert_eq!(e.is_operational(), None);
        assert!(e.stack().unwrap().starts_with("Error: This is a test error"));
    }

    #[test]
    fn converts_std_errors_with_their_type_name() {
        let parse: Result<u32, _> = "x".parse::<u32>();
        let e: AppError = parse.unwrap_err().into();
        assert_eq!(e.name(), "ParseIntError");
        assert_eq!(e.message(), "invalid digit found in string");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let e = AppError::from_panic(Box::new("boom"), None);
        assert_eq!(e.name(), "Panic");
        assert_eq!(e.message(), "boom");
        assert_eq!(e.stack(), Some("Panic: boom"));

        let e = AppError::from_panic(Box::new(String::from("owned")), Some("trace".into()));
        assert_eq!(e.message(), "owned");
        assert_eq!(e.stack(), Some("trace"));
    }
}
