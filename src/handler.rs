//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in a single
//! `HashMap<Method, Tree>`, so each one is hidden behind a trait object
//! (`dyn ErasedHandler`):
//!
//! ```text
//! async fn users(req: Request) -> Result<Response, AppError> { … }   ← user writes this
//!        ↓ router.get("/users", users)
//! users.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(users))                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time               ← one vtable dispatch
//!        ↓
//! Guarded(users(req))                              ← panics become AppErrors
//! ```
//!
//! # Failure forwarding
//!
//! A handler's `Err` is returned to the pipeline, which hands it to the error
//! normalizer. A panic while the handler is being polled is caught by
//! `Guarded` and forwarded the same way, as an `AppError` named `Panic`.
//! Nothing a handler does can skip error normalization.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::AppError;
use crate::fatal;
use crate::middleware::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// What a handler resolves to once erased.
pub(crate) type Outcome = Result<Response, AppError>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Outcome>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any async function
/// or closure shaped like:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, impl Into<AppError>>
/// ```
///
/// Any `std::error::Error` converts into [`AppError`], so `?` works on the
/// usual fallible calls.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R, E> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<AppError> + Send + 'static,
{
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R, E> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Outcome> {
        // A plain fn returning a future can panic before the first poll.
        let started = fatal::in_request_scope(|| {
            panic::catch_unwind(AssertUnwindSafe(|| (self.0)(req)))
        });
        match started {
            Ok(fut) => Box::pin(Guarded::new(async move {
                fut.await.map(IntoResponse::into_response).map_err(Into::into)
            })),
            Err(payload) => {
                let error = AppError::from_panic(payload, fatal::take_panic_trace());
                Box::pin(std::future::ready(Err(error)))
            }
        }
    }
}

// ── Guarded ───────────────────────────────────────────────────────────────────

/// Polls the inner future inside request scope and turns a panic into an
/// `Err`. The inner future is never polled again after it panicked.
struct Guarded {
    inner: Option<BoxFuture<'static, Outcome>>,
}

impl Guarded {
    fn new(fut: impl Future<Output = Outcome> + Send + 'static) -> Self {
        Self { inner: Some(Box::pin(fut)) }
    }
}

impl Future for Guarded {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(Err(AppError::new("handler polled after completion")));
        };
        let polled = fatal::in_request_scope(|| {
            panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx)))
        });
        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(outcome)) => {
                self.inner = None;
                Poll::Ready(outcome)
            }
            Err(payload) => {
                self.inner = None;
                Poll::Ready(Err(AppError::from_panic(payload, fatal::take_panic_trace())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::{Method, StatusCode};

    use super::*;
    use crate::log::{Level, LogSink, Logger, MemoryTransport};
    use crate::middleware::ContextInjector;
    use crate::request::Incoming;
    use crate::response::Respond;

    fn request() -> Request {
        let sink = LogSink::builder()
            .transport(Arc::new(MemoryTransport::new(Level::Debug)))
            .build();
        ContextInjector::new(Logger::new(Arc::new(sink)))
            .inject(Incoming::new(Method::GET, "/".parse().unwrap()))
    }

    #[tokio::test]
    async fn ok_values_become_responses() {
        let handler = (|_req: Request| async { Ok::<_, AppError>("hello") }).into_boxed_handler();
        let response = handler.call(request()).await.unwrap();
        assert_eq!(response.body(), b"hello");
    }

    #[tokio::test]
    async fn std_errors_convert() {
        let handler = (|_req: Request| async {
            let n: u32 = "x".parse()?;
            Ok::<_, std::num::ParseIntError>(n.to_string())
        })
        .into_boxed_handler();
        let error = handler.call(request()).await.unwrap_err();
        assert_eq!(error.name(), "ParseIntError");
    }

    #[tokio::test]
    async fn panics_inside_the_future_are_caught() {
        let handler = (|req: Request| async move {
            if req.path() == "/" {
                panic!("kaboom");
            }
            Ok::<_, AppError>(req.reply().status(StatusCode::OK).text("fine"))
        })
        .into_boxed_handler();

        let error = handler.call(request()).await.unwrap_err();
        assert_eq!(error.name(), "Panic");
        assert_eq!(error.message(), "kaboom");
        assert_eq!(error.status(), None);
    }

    #[tokio::test]
    async fn panics_before_the_first_poll_are_caught() {
        fn eager(_req: Request) -> std::future::Ready<Result<Response, AppError>> {
            panic!("eager")
        }
        let error = eager.into_boxed_handler().call(request()).await.unwrap_err();
        assert_eq!(error.message(), "eager");
    }
}
