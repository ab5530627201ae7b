//! Request pipeline.
//!
//! Every request takes the same path:
//!
//! ```text
//! Incoming ─► ContextInjector ─► AccessLog ─► RateLimit ─► Router ─► handler
//!                                                            │
//!                                     ErrorNormalizer ◄──────┘ (Err, panic, 404, rejected body)
//! ```
//!
//! The injector is not a stage: it is what turns an [`Incoming`] into a
//! [`Request`], so every stage and handler can rely on a context being
//! present. Stages implement [`Middleware`] and either call [`Next::run`] or
//! answer themselves.

mod access_log;
mod context;
mod error;
mod instrument;
mod rate_limit;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use access_log::{AccessLog, AccessRecord, render_development, render_production, write_line};
pub use context::{ContextInjector, RequestContext, RequestSnapshot};
pub use error::{ErrorEntry, ErrorNormalizer, not_found};
pub use instrument::Instrumented;
pub use rate_limit::{Decision, RateLimit};

use crate::request::{Incoming, Request};
use crate::response::Response;
use crate::router::Router;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One pipeline stage.
///
/// A stage calls `next.run(request)` at most once. Not calling it
/// short-circuits the pipeline with the stage's own response.
pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn process<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// Whatever sits after the last stage.
pub trait Endpoint: Send + Sync {
    fn call<'a>(&'a self, request: Request) -> BoxFuture<'a, Response>;
}

/// The rest of the chain, handed to each stage.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn run(self, request: Request) -> BoxFuture<'a, Response> {
        match self.chain.split_first() {
            Some((stage, rest)) => {
                tracing::trace!(stage = stage.name(), "entering stage");
                stage.process(request, Next { chain: rest, endpoint: self.endpoint })
            }
            None => self.endpoint.call(request),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Context injection, stages, routing and error normalization, assembled.
pub struct Pipeline {
    injector: ContextInjector,
    stages: Vec<Arc<dyn Middleware>>,
    dispatch: Dispatch,
}

impl Pipeline {
    pub fn new(injector: ContextInjector, router: Router, errors: ErrorNormalizer) -> Self {
        Self { injector, stages: Vec::new(), dispatch: Dispatch { router, errors } }
    }

    /// Append a stage. Stages run in the order they are added.
    pub fn stage(mut self, stage: impl Middleware) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn handle(&self, incoming: Incoming) -> Response {
        let request = self.injector.inject(incoming);
        Next { chain: &self.stages, endpoint: &self.dispatch }.run(request).await
    }
}

struct Dispatch {
    router: Router,
    errors: ErrorNormalizer,
}

impl Endpoint for Dispatch {
    fn call<'a>(&'a self, mut request: Request) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let ctx = request.context().clone();
            if let Some(rejection) = request.take_rejection() {
                return self.errors.handle(rejection, &ctx);
            }
            match self.router.dispatch(request).await {
                Ok(response) => response,
                Err(error) => self.errors.handle(error, &ctx),
            }
        })
    }
}
