//! Example routes served by the `waypost` binary.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;

use crate::error::AppError;
use crate::health;
use crate::log::Level;
use crate::request::Request;
use crate::response::{Respond, Response};
use crate::router::Router;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub email: &'static str,
    pub id: u32,
    pub name: &'static str,
}

const USERS: [User; 2] = [
    User { email: "john@example.com", id: 1, name: "John Doe" },
    User { email: "jane@example.com", id: 2, name: "Jane Smith" },
];

pub fn router(started: Instant) -> Router {
    Router::new()
        .get("/health",       health::handler(started))
        .get("/",             home)
        .get("/users",        users)
        .get("/error-test",   error_test)
        .get("/profile-test", profile_test)
}

async fn home(req: Request) -> Result<Response, AppError> {
    req.logger().info("Home route accessed");
    Ok(req.reply().json(&json!({
        "message": "Welcome to the API",
        "requestId": req.id(),
    })))
}

async fn users(req: Request) -> Result<Response, AppError> {
    req.logger().info("Fetching users");
    tokio::time::sleep(Duration::from_millis(100)).await;

    req.logger().info(format!("Returning {} users", USERS.len()));
    Ok(req.reply().json(&USERS))
}

async fn error_test(req: Request) -> Result<Response, AppError> {
    req.logger().warn("Error test route accessed");
    Err(AppError::new("This is a test error"))
}

/// Holds the worker thread on purpose: the timer measures CPU-bound work.
async fn profile_test(req: Request) -> Result<Response, AppError> {
    let profiler = req.logger().start_timer();

    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(100) {
        std::hint::spin_loop();
    }

    profiler.done(Level::Info, "Profile test completed");
    Ok(req.reply().json(&json!({ "message": "Profiling test completed" })))
}
