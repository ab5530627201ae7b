//! Process-level fault handling.
//!
//! Two kinds of failure escape request handling and end the process:
//!
//! - a panic on a thread that is not polling a request handler
//!   (**Uncaught Exception**, written to `exceptions.log`), and
//! - a background task started with [`spawn_background`] that returns `Err`
//!   (**Unhandled Rejection**, written to `rejections.log`).
//!
//! Both are logged through the fatal handlers, the sink is flushed, and the
//! process exits with status 1. Panics inside a handler are not fatal: the
//! hook only records their location for the handler adapter, which turns
//! them into 500 responses.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::future::Future;
use std::panic::PanicHookInfo;
use std::sync::Once;

use serde_json::json;
use tokio::task::JoinHandle;

use crate::error::panic_message;
use crate::log::{Fatal, Logger};

thread_local! {
    static IN_REQUEST: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

struct ScopeGuard(bool);

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        IN_REQUEST.with(|flag| flag.set(self.0));
    }
}

/// Run `f` with the current thread marked as serving a request.
pub(crate) fn in_request_scope<T>(f: impl FnOnce() -> T) -> T {
    let previous = IN_REQUEST.with(|flag| flag.replace(true));
    let _guard = ScopeGuard(previous);
    f()
}

pub(crate) fn in_request() -> bool {
    IN_REQUEST.with(Cell::get)
}

/// The trace recorded by the hook for the last in-request panic on this thread.
pub(crate) fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.with(|trace| trace.borrow_mut().take())
}

fn describe(info: &PanicHookInfo<'_>) -> (String, String) {
    let message = panic_message(info.payload());
    let location = info
        .location()
        .map(|l| format!("\n    at {}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_default();
    let stack = format!("Panic: {message}{location}\n{}", Backtrace::force_capture());
    (message, stack)
}

/// Install the process panic hook. Only the first call has any effect.
pub fn install_panic_hook(logger: Logger) {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(move || {
        std::panic::set_hook(Box::new(move |info| {
            let (message, stack) = describe(info);
            if in_request() {
                PANIC_TRACE.with(|trace| *trace.borrow_mut() = Some(stack));
                return;
            }
            logger.fatal(
                Fatal::Exception,
                "Uncaught Exception",
                json!({ "error": { "message": message, "name": "Panic", "stack": stack } }),
            );
            terminate(&logger, 1);
        }));
    });
}

/// Spawn a background task whose failure is fatal.
pub fn spawn_background<F, E>(logger: Logger, task: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(reason) = task.await {
            logger.fatal(
                Fatal::Rejection,
                "Unhandled Rejection",
                json!({ "reason": reason.to_string() }),
            );
            terminate(&logger, 1);
        }
    })
}

/// Flush every transport, then exit.
pub fn terminate(logger: &Logger, code: i32) -> ! {
    logger.sink().flush();
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_is_restored_after_nesting() {
        assert!(!in_request());
        in_request_scope(|| {
            assert!(in_request());
            in_request_scope(|| assert!(in_request()));
            assert!(in_request());
        });
        assert!(!in_request());
    }

    #[test]
    fn scope_is_restored_after_a_caught_panic() {
        let result = std::panic::catch_unwind(|| in_request_scope(|| -> u8 { panic!("inside") }));
        assert!(result.is_err());
        assert!(!in_request());
    }

    #[test]
    fn trace_is_taken_once() {
        PANIC_TRACE.with(|t| *t.borrow_mut() = Some("trace".into()));
        assert_eq!(take_panic_trace().as_deref(), Some("trace"));
        assert_eq!(take_panic_trace(), None);
    }
}
