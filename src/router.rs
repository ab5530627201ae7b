//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. A path with no matching
//! route, under any method, is a 404 failure handed back to the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler, Outcome};
use crate::middleware::not_found;
use crate::request::Request;

/// The application router.
///
/// Build it once at startup and hand it to the pipeline. Each registration
/// returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Route `req` and run its handler. `HEAD` falls back to the `GET` route.
    pub(crate) async fn dispatch(&self, mut req: Request) -> Outcome {
        let found = self.lookup(&req.method, req.path()).or_else(|| {
            (req.method == Method::HEAD).then(|| self.lookup(&Method::GET, req.path())).flatten()
        });
        let Some((handler, params)) = found else {
            return Err(not_found(req.original_url()));
        };
        req.params = params;
        handler.call(req).await
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
