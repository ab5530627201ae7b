//! Call-time response observation.
//!
//! [`Instrumented`] wraps any [`Respond`] implementation and logs against the
//! owning request: a warning as soon as an error status is set, and an
//! "Outgoing response" event when a JSON body is emitted. The access log
//! reports the same response again at wire completion; the two are
//! independent.

use http::StatusCode;
use serde_json::json;

use crate::middleware::RequestContext;
use crate::response::{Respond, Response};

pub struct Instrumented<R> {
    inner: R,
    ctx: RequestContext,
    status: StatusCode,
}

impl<R: Respond> Instrumented<R> {
    pub fn new(inner: R, ctx: RequestContext) -> Self {
        Self { inner, ctx, status: StatusCode::OK }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Respond> Respond for Instrumented<R> {
    fn status(mut self, code: StatusCode) -> Self {
        if code.as_u16() >= 400 {
            self.ctx.logger().warn(format!("HTTP {} response", code.as_u16()));
        }
        self.status = code;
        self.inner = self.inner.status(code);
        self
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    fn json_bytes(self, body: Vec<u8>) -> Response {
        let elapsed = self.ctx.started().elapsed().as_millis() as u64;
        self.ctx.logger().info_with(
            "Outgoing response",
            json!({
                "contentLength": body.len(),
                "responseTime": elapsed,
                "statusCode": self.status.as_u16(),
            }),
        );
        self.inner.json_bytes(body)
    }

    fn text(self, body: impl Into<String>) -> Response {
        self.inner.text(body)
    }
}
