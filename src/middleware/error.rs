//! Error normalization.
//!
//! Every request-scoped failure ends here: handler errors, caught panics,
//! unmatched routes and body rejections. Each one is normalized into an
//! [`ErrorEntry`], logged once with the request snapshot, and answered with
//! the same JSON envelope:
//!
//! ```json
//! { "error": { "message": "…", "stack": "…", "requestId": "…" }, "timestamp": "…" }
//! ```
//!
//! `stack` is only present in development.

use chrono::{SecondsFormat, Utc};
use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::log::Logger;
use crate::middleware::RequestContext;
use crate::response::{Respond, Response};

/// A failure after normalization: status and operational flag are always set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub is_operational: bool,
    pub message: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub status_code: u16,
}

impl ErrorEntry {
    /// Fill defaults: status 500, not operational.
    pub fn normalize(error: &AppError) -> Self {
        Self {
            is_operational: error.is_operational().unwrap_or(false),
            message: error.message().to_owned(),
            name: error.name().to_owned(),
            stack: error.stack().map(str::to_owned),
            status_code: error.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR).as_u16(),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// The 404 failure for a path no route matched.
pub fn not_found(url: &str) -> AppError {
    AppError::new(format!("Route {url} not found"))
        .with_status(StatusCode::NOT_FOUND)
        .operational(true)
}

#[derive(Clone)]
pub struct ErrorNormalizer {
    expose_stack: bool,
    fallback: Logger,
}

impl ErrorNormalizer {
    /// `fallback` logs failures that have no request context.
    pub fn new(fallback: Logger, expose_stack: bool) -> Self {
        Self { expose_stack, fallback }
    }

    pub fn handle(&self, error: AppError, ctx: &RequestContext) -> Response {
        let entry = ErrorEntry::normalize(&error);
        self.report(&entry, Some(ctx));
        self.respond(&entry, ctx)
    }

    /// Log one `error` event with the entry and, when known, the request.
    pub fn report(&self, entry: &ErrorEntry, ctx: Option<&RequestContext>) {
        let mut meta = Map::new();
        meta.insert("error".into(), serde_json::to_value(entry).unwrap_or(Value::Null));
        match ctx {
            Some(ctx) => {
                meta.insert("request".into(), ctx.snapshot().to_json());
                ctx.logger().error_with("Request error", Value::Object(meta));
            }
            None => {
                let logger = self.fallback.child_from(json!({ "requestId": "unknown" }));
                logger.error_with("Request error", Value::Object(meta));
            }
        }
    }

    pub fn respond(&self, entry: &ErrorEntry, ctx: &RequestContext) -> Response {
        let mut error = Map::new();
        error.insert("message".into(), entry.message.clone().into());
        if self.expose_stack {
            if let Some(stack) = &entry.stack {
                error.insert("stack".into(), stack.clone().into());
            }
        }
        error.insert("requestId".into(), ctx.id().to_string().into());

        let body = json!({
            "error": error,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        let mut response = ctx.reply().status(entry.status()).json(&body);
        response.set_error_message(entry.message.clone());
        response
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::Method;

    use super::*;
    use crate::log::{Level, LogSink, MemoryTransport};
    use crate::middleware::ContextInjector;
    use crate::request::Incoming;

    fn setup(expose_stack: bool) -> (ErrorNormalizer, RequestContext, MemoryTransport) {
        let memory = MemoryTransport::new(Level::Debug);
        let sink = LogSink::builder().level(Level::Debug).transport(Arc::new(memory.clone())).build();
        let logger = Logger::new(Arc::new(sink));
        let req = ContextInjector::new(logger.clone())
            .inject(Incoming::new(Method::GET, "/error-test?x=1".parse().unwrap()));
        memory.clear();
        (ErrorNormalizer::new(logger, expose_stack), req.context().clone(), memory)
    }

    fn body(response: &Response) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn plain_error_defaults_to_500() {
        let entry = ErrorEntry::normalize(&AppError::new("This is a test error"));
        assert_eq!(entry.status_code, 500);
        assert!(!entry.is_operational);
        assert_eq!(entry.name, "Error");
    }

    #[test]
    fn production_hides_stack() {
        let (errors, ctx, _) = setup(false);
        let response = errors.handle(AppError::new("This is a test error"), &ctx);

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(&response);
        assert_eq!(body["error"]["message"], "This is a test error");
        assert_eq!(body["error"]["requestId"], ctx.id().to_string());
        assert!(body["error"].get("stack").is_none());
        assert!(body["timestamp"].is_string());
        assert_eq!(response.error_message(), Some("This is a test error"));
    }

    #[test]
    fn development_exposes_stack() {
        let (errors, ctx, _) = setup(true);
        let response = errors.handle(AppError::new("This is a test error"), &ctx);
        let stack = body(&response)["error"]["stack"].as_str().unwrap().to_owned();
        assert!(stack.starts_with("Error: This is a test error"));
    }

    #[test]
    fn own_status_is_kept() {
        let (errors, ctx, _) = setup(false);
        let err = AppError::new("nope").with_status(StatusCode::CONFLICT).operational(true);
        assert_eq!(errors.handle(err, &ctx).status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn logs_entry_with_request_snapshot() {
        let (errors, ctx, memory) = setup(false);
        errors.handle(not_found("/nowhere"), &ctx);

        let events = memory.events();
        let messages: Vec<_> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["Request error", "HTTP 404 response", "Outgoing response"]);

        let logged = &events[0];
        assert_eq!(logged.level, Level::Error);
        assert_eq!(logged.field("requestId").unwrap(), &ctx.id().to_string());
        let error = logged.field("error").unwrap();
        assert_eq!(error["statusCode"], 404);
        assert_eq!(error["isOperational"], true);
        assert_eq!(error["message"], "Route /nowhere not found");
        let request = logged.field("request").unwrap();
        assert_eq!(request["method"], "GET");
        assert_eq!(request["url"], "/error-test?x=1");
        assert_eq!(request["query"]["x"], "1");
    }

    #[test]
    fn missing_context_uses_fallback_logger() {
        let (errors, _, memory) = setup(false);
        errors.report(&ErrorEntry::normalize(&AppError::new("boom")), None);

        let event = &memory.events()[0];
        assert_eq!(event.field("requestId").unwrap(), "unknown");
        assert!(event.field("request").is_none());
    }
}
