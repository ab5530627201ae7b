//! Minimal waypost example: custom routes on the logging pipeline.
//!
//! Run with:
//!   ENVIRONMENT_MODE=development LOG_LEVEL=http cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/orders/42
//!   curl -X POST http://localhost:3000/orders \
//!        -H 'content-type: application/json' \
//!        -d '{"item":"coffee","qty":2}'
//!   curl -X POST http://localhost:3000/orders -H 'content-type: application/json' -d '{}'
//!   curl http://localhost:3000/nope
//!
//! Every request shows up as "Incoming request", an access-log line, and
//! for failures a "Request error" event, all tagged with the same requestId.

use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use serde_json::json;
use waypost::middleware::{AccessLog, ContextInjector, ErrorNormalizer, Pipeline, RateLimit};
use waypost::{AppError, Request, Respond, Response, Router, Server, Settings, Telemetry, health};

#[tokio::main]
async fn main() -> Result<(), waypost::Error> {
    let settings = Settings::from_env()?;
    let telemetry = Telemetry::init(&settings)?;
    let logger = telemetry.logger().clone();

    let router = Router::new()
        .get("/health",      health::handler(Instant::now()))
        .get("/orders/{id}", get_order)
        .post("/orders",     create_order);

    let pipeline = Pipeline::new(
        ContextInjector::new(logger.clone()),
        router,
        ErrorNormalizer::new(logger, !settings.redact_stack),
    )
    .stage(AccessLog::new(settings.mode).skip_in_production(["/health"]))
    .stage(RateLimit::default());

    Server::bind(&settings.host, settings.port)
        .await?
        .serve_with_shutdown(Arc::new(pipeline), waypost::shutdown_signal())
        .await;

    telemetry.shutdown();
    Ok(())
}

// GET /orders/{id}
//
// A non-numeric id is a client error: operational, 400.
async fn get_order(req: Request) -> Result<Response, AppError> {
    let raw = req.param("id").unwrap_or_default();
    let id: u64 = raw.parse().map_err(|_| {
        AppError::new(format!("order id `{raw}` is not a number"))
            .with_status(StatusCode::BAD_REQUEST)
            .operational(true)
    })?;

    req.logger().info_with("Loading order", json!({ "orderId": id }));
    Ok(req.reply().json(&json!({ "id": id, "item": "coffee", "qty": 1 })))
}

// POST /orders
//
// The body was parsed by the pipeline; req.json() is the result.
async fn create_order(req: Request) -> Result<Response, AppError> {
    let Some(item) = req.json().and_then(|b| b.get("item")).and_then(|v| v.as_str()) else {
        return Err(AppError::new("`item` is required")
            .with_status(StatusCode::UNPROCESSABLE_ENTITY)
            .operational(true));
    };

    req.logger().info_with("Order created", json!({ "item": item }));
    Ok(req
        .reply()
        .status(StatusCode::CREATED)
        .header("location", "/orders/99")
        .json(&json!({ "id": 99, "item": item })))
}
