//! Correlation id and per-request logger.
//!
//! [`ContextInjector`] runs first for every request. It assigns a random
//! 128-bit id, records the arrival time, derives a child logger carrying the
//! request's identity, and logs "Incoming request". Everything downstream
//! reaches the result through [`RequestContext`].

use std::sync::Arc;
use std::time::Instant;

use http::Method;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::log::Logger;
use crate::middleware::Instrumented;
use crate::request::{Incoming, Request};
use crate::response::{Response, ResponseBuilder};

/// Shared, immutable per-request state. Cloning is an `Arc` bump.
#[derive(Clone)]
pub struct RequestContext(Arc<Inner>);

struct Inner {
    id: Uuid,
    started: Instant,
    logger: Logger,
    snapshot: RequestSnapshot,
}

impl RequestContext {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Monotonic arrival time, for elapsed-time measurements.
    pub fn started(&self) -> Instant {
        self.0.started
    }

    pub fn logger(&self) -> &Logger {
        &self.0.logger
    }

    pub fn snapshot(&self) -> &RequestSnapshot {
        &self.0.snapshot
    }

    /// Response builder whose emission calls are logged against this request.
    pub fn reply(&self) -> Instrumented<ResponseBuilder> {
        Instrumented::new(Response::builder(), self.clone())
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.0.id)
            .field("method", &self.0.snapshot.method)
            .field("url", &self.0.snapshot.url)
            .finish_non_exhaustive()
    }
}

/// What was known about the request when it arrived. Logged alongside errors.
#[derive(Clone, Debug)]
pub struct RequestSnapshot {
    pub method: Method,
    /// Path plus query string.
    pub url: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub headers: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
}

impl RequestSnapshot {
    pub fn to_json(&self) -> Value {
        json!({
            "body": self.body.clone().unwrap_or_else(|| Value::Object(Map::new())),
            "headers": self.headers,
            "ip": self.ip,
            "method": self.method.as_str(),
            "query": self.query,
            "url": self.url,
            "userAgent": self.user_agent,
        })
    }
}

// ── Injector ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ContextInjector {
    logger: Logger,
}

impl ContextInjector {
    /// `logger` is the process-wide logger; request loggers are its children.
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn inject(&self, incoming: Incoming) -> Request {
        let id = Uuid::new_v4();
        let started = Instant::now();

        let (body, rejection) = match incoming.parse_body() {
            Ok(body) => (body, None),
            Err(e) => (None, Some(e)),
        };
        let snapshot = RequestSnapshot {
            method: incoming.method.clone(),
            url: incoming.original_url(),
            ip: incoming.client_ip(),
            user_agent: incoming.user_agent(),
            headers: incoming.headers_json(),
            query: incoming.query_json(),
            body,
        };

        let mut bound = Map::new();
        bound.insert("ip".into(), snapshot.ip.clone().into());
        bound.insert("method".into(), snapshot.method.as_str().into());
        bound.insert("requestId".into(), id.to_string().into());
        bound.insert("url".into(), snapshot.url.clone().into());
        if let Some(agent) = &snapshot.user_agent {
            bound.insert("userAgent".into(), agent.clone().into());
        }
        let logger = self.logger.child(bound);

        let mut meta = Map::new();
        meta.insert("headers".into(), Value::Object(snapshot.headers.clone()));
        meta.insert("query".into(), Value::Object(snapshot.query.clone()));
        if let Some(body) = snapshot.body.as_ref().filter(|b| is_non_empty_structured(b)) {
            meta.insert("body".into(), body.clone());
        }
        logger.info_with("Incoming request", Value::Object(meta));

        let ctx = RequestContext(Arc::new(Inner {
            id,
            started,
            logger,
            snapshot,
        }));

        let incoming = match rejection {
            Some(error) => incoming.reject(error),
            None => incoming,
        };
        Request::new(incoming, ctx)
    }
}

fn is_non_empty_structured(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::log::{Level, LogSink, MemoryTransport};

    fn injector() -> (ContextInjector, MemoryTransport) {
        let memory = MemoryTransport::new(Level::Debug);
        let sink = LogSink::builder()
            .level(Level::Debug)
            .default_field("service", "test-svc")
            .transport(Arc::new(memory.clone()))
            .build();
        (ContextInjector::new(Logger::new(Arc::new(sink))), memory)
    }

    fn get(uri: &str) -> Incoming {
        Incoming::new(Method::GET, uri.parse().unwrap())
            .remote_addr("127.0.0.1:4000".parse().unwrap())
    }

    #[test]
    fn logs_incoming_request_with_bound_fields() {
        let (injector, memory) = injector();
        let req = injector.inject(get("/users?page=2").header("user-agent", "curl/8.0"));

        let events = memory.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.message, "Incoming request");
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.field("requestId").unwrap(), &req.id().to_string());
        assert_eq!(event.field("method").unwrap(), "GET");
        assert_eq!(event.field("url").unwrap(), "/users?page=2");
        assert_eq!(event.field("ip").unwrap(), "127.0.0.1");
        assert_eq!(event.field("userAgent").unwrap(), "curl/8.0");
        assert_eq!(event.field("service").unwrap(), "test-svc");
        assert_eq!(event.field("query").unwrap()["page"], "2");
        assert!(event.field("body").is_none());
    }

    #[test]
    fn empty_bodies_are_not_logged() {
        let (injector, memory) = injector();
        injector.inject(get("/").header("content-type", "application/json").body("{}"));
        injector.inject(get("/").header("content-type", "application/json").body(r#"{"a":1}"#));

        let events = memory.events();
        assert!(events[0].field("body").is_none());
        assert_eq!(events[1].field("body").unwrap()["a"], 1);
    }

    #[test]
    fn malformed_json_becomes_a_rejection() {
        let (injector, memory) = injector();
        let mut req = injector.inject(get("/").header("content-type", "application/json").body("{"));
        assert!(req.take_rejection().is_some());
        assert_eq!(memory.messages(), vec!["Incoming request"]);
    }

    #[test]
    fn request_logger_carries_the_id() {
        let (injector, memory) = injector();
        let req = injector.inject(get("/"));
        memory.clear();

        req.logger().info("Home route accessed");
        assert_eq!(memory.events()[0].field("requestId").unwrap(), &req.id().to_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ids_are_unique_under_concurrency() {
        let (injector, _memory) = injector();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10_000 {
            let injector = injector.clone();
            tasks.spawn(async move { injector.inject(get("/")).id() });
        }

        let mut seen = HashSet::new();
        while let Some(id) = tasks.join_next().await {
            assert!(seen.insert(id.unwrap()), "duplicate request id");
        }
        assert_eq!(seen.len(), 10_000);
    }
}
