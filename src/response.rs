//! Outgoing HTTP response type, the [`Respond`] emission contract and the
//! [`IntoResponse`] conversion trait.
//!
//! Handlers usually build responses through [`Request::reply`], which returns
//! an instrumented [`Respond`] implementation bound to the request. Building
//! directly with [`Response::builder`] also works; it just is not observed by
//! the response instrumentation.
//!
//! [`Request::reply`]: crate::Request::reply

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::body::{CompletionBody, CompletionHook};

/// What a completion hook learns about the response once it has been sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completed {
    pub status: StatusCode,
    /// `None` for statuses that carry no body (1xx, 204, 304).
    pub content_length: Option<usize>,
    /// Set by the error normalizer when this response reports a failure.
    pub error_message: Option<String>,
}

type Hook = Box<dyn FnOnce(&Completed) + Send + 'static>;

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use waypost::{Respond, Response};
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(&serde_json::json!({ "id": 42 }));
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) error_message: Option<String>,
    hooks: Vec<Hook>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

impl Response {
    /// `200 OK`, `application/json`, pre-serialized bytes.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json_bytes(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).no_body()
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Set a header, replacing any previous value. Invalid names or values are ignored.
    pub fn insert_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.insert(name, value);
        }
    }

    /// Register `hook` to run once the response has been fully sent or abandoned.
    pub fn on_complete(&mut self, hook: impl FnOnce(&Completed) + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Number of body bytes this response reports, if it reports any.
    pub fn content_length(&self) -> Option<usize> {
        let bodiless = self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED;
        (!bodiless).then_some(self.body.len())
    }

    /// Convert into the `http` type served by hyper. Completion hooks move
    /// into the body and run when it is drained or dropped.
    pub fn into_http(self) -> http::Response<CompletionBody> {
        let completed = Completed {
            status: self.status,
            content_length: self.content_length(),
            error_message: self.error_message,
        };
        let hooks = self.hooks;
        let hook: Option<CompletionHook> = (!hooks.is_empty()).then(|| {
            Box::new(move || {
                for hook in hooks {
                    hook(&completed);
                }
            }) as CompletionHook
        });

        let mut response = http::Response::new(CompletionBody::new(self.body, hook));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

// ── Respond ───────────────────────────────────────────────────────────────────

/// The response-emission contract: set a status, then emit a body.
///
/// [`ResponseBuilder`] is the plain implementation. Decorators (such as the
/// instrumented responder returned by [`Request::reply`](crate::Request::reply))
/// wrap another `Respond` and add side effects without changing the contract.
pub trait Respond: Sized {
    /// Set the status code for the eventual response.
    fn status(self, code: StatusCode) -> Self;

    fn header(self, name: &str, value: &str) -> Self;

    /// Emit a pre-serialized JSON payload.
    fn json_bytes(self, body: Vec<u8>) -> Response;

    /// Emit a plain-text payload.
    fn text(self, body: impl Into<String>) -> Response;

    /// Serialize `value` and emit it through [`json_bytes`](Self::json_bytes).
    fn json<T: Serialize + ?Sized>(self, value: &T) -> Response {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.json_bytes(bytes),
            Err(e) => self
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text(format!("failed to serialize response: {e}")),
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        self.finish(None, Bytes::new())
    }

    fn finish(mut self, content_type: Option<&'static str>, body: Bytes) -> Response {
        if let Some(content_type) = content_type {
            self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        Response {
            status: self.status,
            headers: self.headers,
            body,
            error_message: None,
            hooks: Vec::new(),
        }
    }
}

impl Respond for ResponseBuilder {
    fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    fn json_bytes(self, body: Vec<u8>) -> Response {
        self.finish(Some("application/json"), Bytes::from(body))
    }

    fn text(self, body: impl Into<String>) -> Response {
        self.finish(Some("text/plain; charset=utf-8"), Bytes::from(body.into()))
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`]. Implement it on your own types to
/// return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `Ok(StatusCode::NO_CONTENT)`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}
