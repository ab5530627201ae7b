//! Incoming HTTP request types.
//!
//! [`Incoming`] is what the server reads off the connection. The context
//! injector turns it into a [`Request`], which always carries a
//! [`RequestContext`]: correlation id, start time and the request's logger.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::log::Logger;
use crate::middleware::{Instrumented, RequestContext};
use crate::response::ResponseBuilder;

// ── Incoming ──────────────────────────────────────────────────────────────────

/// A request as read from the connection, before any context exists.
pub struct Incoming {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) rejection: Option<AppError>,
}

impl Incoming {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            rejection: None,
        }
    }

    /// Append a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes, remote_addr: SocketAddr) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr: Some(remote_addr),
            rejection: None,
        }
    }

    /// Mark the request as failed before routing (e.g. body too large).
    /// The failure is reported through the error normalizer.
    pub(crate) fn reject(mut self, error: AppError) -> Self {
        self.rejection = Some(error);
        self
    }

    /// Path plus query string, as the client sent it.
    pub fn original_url(&self) -> String {
        original_url(&self.uri)
    }

    /// Client address. With one trusted proxy hop, the right-most
    /// `X-Forwarded-For` entry wins over the socket peer.
    pub fn client_ip(&self) -> String {
        let forwarded = self
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').map(str::trim).find(|s| !s.is_empty()));
        match (forwarded, self.remote_addr) {
            (Some(ip), _) => ip.to_owned(),
            (None, Some(addr)) => addr.ip().to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn user_agent(&self) -> Option<String> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_owned)
    }

    /// Header map as JSON, one string per name; repeated headers are joined with `, `.
    pub(crate) fn headers_json(&self) -> Map<String, Value> {
        let mut out: Map<String, Value> = Map::new();
        for name in self.headers.keys() {
            let joined = self
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            out.insert(name.as_str().to_owned(), Value::String(joined));
        }
        out
    }

    pub(crate) fn query_json(&self) -> Map<String, Value> {
        parse_pairs(self.uri.query().unwrap_or("").as_bytes())
    }

    /// Parse the body according to its content type.
    ///
    /// `Ok(None)` for an empty body or a type that is not parsed; an
    /// operational 400 for malformed JSON.
    pub(crate) fn parse_body(&self) -> Result<Option<Value>, AppError> {
        if self.body.is_empty() {
            return Ok(None);
        }
        let content_type = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        match content_type.as_str() {
            "application/json" => serde_json::from_slice(&self.body).map(Some).map_err(|e| {
                AppError::named("SyntaxError", e.to_string())
                    .with_status(StatusCode::BAD_REQUEST)
                    .operational(true)
            }),
            "application/x-www-form-urlencoded" => Ok(Some(Value::Object(parse_pairs(&self.body)))),
            _ => Ok(None),
        }
    }
}

pub(crate) fn original_url(uri: &Uri) -> String {
    uri.path_and_query().map(|pq| pq.as_str().to_owned()).unwrap_or_else(|| "/".to_owned())
}

/// `a=1&b=two` → `{"a":"1","b":"two"}`. A repeated key keeps the last value.
fn parse_pairs(input: &[u8]) -> Map<String, Value> {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

// ── Request ───────────────────────────────────────────────────────────────────

/// An incoming HTTP request with its request context attached.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) ctx: RequestContext,
    pub(crate) rejection: Option<AppError>,
}

impl Request {
    pub(crate) fn new(incoming: Incoming, ctx: RequestContext) -> Self {
        Self {
            method: incoming.method,
            uri: incoming.uri,
            headers: incoming.headers,
            body: incoming.body,
            params: HashMap::new(),
            ctx,
            rejection: incoming.rejection,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Path plus query string.
    pub fn original_url(&self) -> &str {
        &self.ctx.snapshot().url
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Query parameters as a JSON object of strings.
    pub fn query(&self) -> &Map<String, Value> {
        &self.ctx.snapshot().query
    }

    /// The parsed body (JSON or form), if there was one.
    pub fn json(&self) -> Option<&Value> {
        self.ctx.snapshot().body.as_ref()
    }

    pub fn client_ip(&self) -> &str {
        &self.ctx.snapshot().ip
    }

    /// Correlation id assigned on arrival.
    pub fn id(&self) -> Uuid {
        self.ctx.id()
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Logger bound to this request's id, method, url, client address and user agent.
    pub fn logger(&self) -> &Logger {
        self.ctx.logger()
    }

    /// Start an instrumented response for this request.
    pub fn reply(&self) -> Instrumented<ResponseBuilder> {
        self.ctx.reply()
    }

    pub(crate) fn take_rejection(&mut self) -> Option<AppError> {
        self.rejection.take()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.ctx.id())
            .field("method", &self.method)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}
