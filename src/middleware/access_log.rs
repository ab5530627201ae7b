//! One access-log event per request, written when the response completes.
//!
//! Development renders `METHOD URL STATUS RT ms - LENGTH`; production renders
//! a single-line JSON record that is handed to the sink as structured
//! fields under the message `incoming-request`. Both go out at `http`
//! severity through the request's child logger, so the event carries the
//! correlation id like everything else logged for that request.

use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::config::Mode;
use crate::log::Logger;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;
use crate::response::{Completed, Response};

const PLACEHOLDER: &str = "UNKNOWN";

/// Request-side facts captured before the handler runs.
#[derive(Clone, Debug, Default)]
pub struct AccessRecord {
    pub method: Option<String>,
    pub url: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub status: Option<u16>,
    /// Milliseconds, rounded to three decimals.
    pub response_time: Option<f64>,
    pub content_length: Option<usize>,
    pub error_message: Option<String>,
}

impl AccessRecord {
    fn from_request(req: &Request) -> Self {
        let snapshot = req.context().snapshot();
        Self {
            method: Some(snapshot.method.as_str().to_owned()),
            url: Some(snapshot.url.clone()),
            remote_addr: Some(snapshot.ip.clone()),
            user_agent: snapshot.user_agent.clone(),
            ..Self::default()
        }
    }

    fn complete(mut self, done: &Completed, started: Instant) -> Self {
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        self.status = Some(done.status.as_u16());
        self.response_time = Some((elapsed * 1000.0).round() / 1000.0);
        self.content_length = done.content_length;
        self.error_message = done.error_message.clone().filter(|m| !m.is_empty());
        self
    }
}

/// Human-readable line. Missing tokens become fixed placeholders.
pub fn render_development(record: &AccessRecord) -> String {
    format!(
        "{} {} {} {} ms - {}",
        record.method.as_deref().unwrap_or(PLACEHOLDER),
        record.url.as_deref().unwrap_or(PLACEHOLDER),
        record.status.map_or_else(|| PLACEHOLDER.to_owned(), |s| s.to_string()),
        record.response_time.map_or_else(|| "0".to_owned(), |t| format!("{t:.3}")),
        record.content_length.map_or_else(|| "0".to_owned(), |l| l.to_string()),
    )
}

/// Single-line JSON record. Absent optional tokens are left out.
pub fn render_production(record: &AccessRecord) -> String {
    let mut out = Map::new();
    if let Some(length) = record.content_length {
        out.insert("content_length".into(), length.to_string().into());
    }
    if let Some(method) = &record.method {
        out.insert("method".into(), method.clone().into());
    }
    if let Some(addr) = &record.remote_addr {
        out.insert("remote_addr".into(), addr.clone().into());
    }
    out.insert("response_time".into(), number(record.response_time.unwrap_or(0.0)));
    out.insert("status".into(), record.status.unwrap_or(0).into());
    out.insert(
        "timestamp".into(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true).into(),
    );
    if let Some(url) = &record.url {
        out.insert("url".into(), url.clone().into());
    }
    if let Some(agent) = &record.user_agent {
        out.insert("user_agent".into(), agent.clone().into());
    }
    if let Some(message) = &record.error_message {
        out.insert("error_message".into(), message.clone().into());
    }
    Value::Object(out).to_string()
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::from(0), Value::Number)
}

/// Hand a rendered line to the logger at `http` severity.
///
/// In production a line that parses as a JSON object goes through as
/// structured fields; anything else is logged as trimmed text.
pub fn write_line(logger: &Logger, mode: Mode, line: &str) {
    if mode == Mode::Production {
        if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(line) {
            logger.http_with("incoming-request", Value::Object(data));
            return;
        }
    }
    logger.http(line.trim());
}

// ── Middleware ────────────────────────────────────────────────────────────────

pub struct AccessLog {
    mode: Mode,
    skip: Arc<[String]>,
}

impl AccessLog {
    pub fn new(mode: Mode) -> Self {
        Self { mode, skip: Arc::from(Vec::new()) }
    }

    /// URLs that are not logged in production.
    pub fn skip_in_production<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip = urls.into_iter().map(Into::into).collect();
        self
    }

    fn skips(&self, url: &str) -> bool {
        self.mode == Mode::Production && self.skip.iter().any(|s| s == url)
    }
}

impl Middleware for AccessLog {
    fn name(&self) -> &'static str {
        "access-log"
    }

    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let started = Instant::now();
            if self.skips(req.original_url()) {
                return next.run(req).await;
            }

            let record = AccessRecord::from_request(&req);
            let logger = req.logger().clone();
            let mut response = next.run(req).await;

            let mode = self.mode;
            response.on_complete(move |done| {
                let record = record.complete(done, started);
                let line = match mode {
                    Mode::Development => render_development(&record),
                    Mode::Production => render_production(&record),
                };
                write_line(&logger, mode, &line);
            });
            response
        })
    }
}
