//! Fixed-window rate limiting per client address.
//!
//! Each client gets `limit` requests per `window`. The window starts at the
//! client's first request and resets all at once when it expires. Every
//! response carries the standard headers:
//!
//! - `RateLimit-Policy`: `<limit>;w=<window seconds>`
//! - `RateLimit-Limit`: requests allowed per window
//! - `RateLimit-Remaining`: requests left in the current window
//! - `RateLimit-Reset`: seconds until the window resets
//!
//! Rejected requests get `429` with `Retry-After`. The rejection goes
//! through the request's instrumented responder, so it is warn-logged.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use http::StatusCode;
use parking_lot::Mutex;

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;
use crate::response::{Respond, Response};

/// Expired windows are swept once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
}

/// Outcome of one [`RateLimit::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

#[derive(Debug)]
pub struct RateLimit {
    limit: u64,
    window: Duration,
    message: String,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(15 * 60))
    }
}

impl RateLimit {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            message: "Too many requests from this IP".to_owned(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Body text of the `429` response.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Count one request from `key` at `now`.
    pub fn check(&self, key: &str, now: Instant) -> Decision {
        let mut windows = self.windows.lock();
        if windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let entry = windows
            .entry(key.to_owned())
            .or_insert(Window { count: 0, started: now });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window { count: 0, started: now };
        }
        entry.count += 1;

        Decision {
            allowed: entry.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.saturating_duration_since(entry.started)),
        }
    }

    fn policy(&self) -> String {
        format!("{};w={}", self.limit, self.window.as_secs())
    }
}

fn reset_secs(decision: &Decision) -> u64 {
    decision.reset_after.as_secs_f64().ceil() as u64
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let decision = self.check(req.client_ip(), Instant::now());
            let reset = reset_secs(&decision).to_string();

            if !decision.allowed {
                return req
                    .reply()
                    .status(StatusCode::TOO_MANY_REQUESTS)
                    .header("ratelimit-policy", &self.policy())
                    .header("ratelimit-limit", &decision.limit.to_string())
                    .header("ratelimit-remaining", "0")
                    .header("ratelimit-reset", &reset)
                    .header("retry-after", &reset)
                    .text(self.message.clone());
            }

            let mut response = next.run(req).await;
            response.insert_header("ratelimit-policy", &self.policy());
            response.insert_header("ratelimit-limit", &decision.limit.to_string());
            response.insert_header("ratelimit-remaining", &decision.remaining.to_string());
            response.insert_header("ratelimit-reset", &reset);
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_and_first_request_is_limited() {
        let limiter = RateLimit::default();
        let now = Instant::now();
        for i in 1..=100 {
            let d = limiter.check("1.2.3.4", now);
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.remaining, 100 - i);
        }
        let d = limiter.check("1.2.3.4", now);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_after, Duration::from_secs(900));
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = RateLimit::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check("a", now).allowed);
        assert!(!limiter.check("a", now).allowed);
        assert!(limiter.check("b", now).allowed);
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let limiter = RateLimit::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.check("a", start);
        limiter.check("a", start);
        assert!(!limiter.check("a", start + Duration::from_secs(30)).allowed);

        let later = limiter.check("a", start + Duration::from_secs(60));
        assert!(later.allowed);
        assert_eq!(later.remaining, 1);
        assert_eq!(later.reset_after, Duration::from_secs(60));
    }
}
