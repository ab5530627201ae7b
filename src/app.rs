//! Assembles the request pipeline for a set of settings.

use std::time::Instant;

use crate::config::Settings;
use crate::log::Logger;
use crate::middleware::{AccessLog, ContextInjector, ErrorNormalizer, Pipeline, RateLimit};
use crate::routes;

/// Paths left out of the access log in production.
pub const QUIET_PATHS: [&str; 1] = ["/health"];

/// The full pipeline: context injection, access log, rate limit, routes,
/// error normalization. `logger` is the root logger; `started` is process
/// start, reported by `/health` as uptime.
pub fn build(settings: &Settings, logger: Logger, started: Instant) -> Pipeline {
    build_with(settings, logger, started, RateLimit::default())
}

/// [`build`] with a custom rate limiter.
pub fn build_with(settings: &Settings, logger: Logger, started: Instant, limiter: RateLimit) -> Pipeline {
    Pipeline::new(
        ContextInjector::new(logger.clone()),
        routes::router(started),
        ErrorNormalizer::new(logger, !settings.redact_stack),
    )
    .stage(AccessLog::new(settings.mode).skip_in_production(QUIET_PATHS))
    .stage(limiter)
}
