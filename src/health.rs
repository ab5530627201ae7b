//! Health-check handler.
//!
//! `GET /health` answers `200` with `{"status":"OK","timestamp":…,"uptime":…}`,
//! `uptime` being seconds since `started`. In production the access log
//! skips this path so probes do not drown real traffic.
//!
//! ```rust,no_run
//! use std::time::Instant;
//! use waypost::{Router, health};
//!
//! let app = Router::new().get("/health", health::handler(Instant::now()));
//! ```

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use http::StatusCode;
use serde_json::json;

use crate::error::AppError;
use crate::response::{Respond, Response};
use crate::{Handler, Request};

/// Build the health handler for a process that started at `started`.
pub fn handler(started: Instant) -> impl Handler {
    move |req: Request| async move {
        Ok::<Response, AppError>(req.reply().status(StatusCode::OK).json(&json!({
            "status": "OK",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "uptime": started.elapsed().as_secs_f64(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::Method;
    use serde_json::Value;

    use super::*;
    use crate::log::{Level, LogSink, Logger, MemoryTransport};
    use crate::middleware::{ContextInjector, ErrorNormalizer, Pipeline};
    use crate::request::Incoming;
    use crate::Router;

    #[tokio::test]
    async fn reports_status_and_uptime() {
        let sink = LogSink::builder()
            .transport(Arc::new(MemoryTransport::new(Level::Debug)))
            .build();
        let logger = Logger::new(Arc::new(sink));
        let started = Instant::now() - std::time::Duration::from_secs(2);
        let pipeline = Pipeline::new(
            ContextInjector::new(logger.clone()),
            Router::new().get("/health", handler(started)),
            ErrorNormalizer::new(logger, false),
        );

        let response = pipeline
            .handle(Incoming::new(Method::GET, "/health".parse().unwrap()))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "OK");
        assert!(body["uptime"].as_f64().unwrap() >= 2.0);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
