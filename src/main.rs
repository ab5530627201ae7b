use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use waypost::telemetry::{RETENTION_PERIOD, retention_sweeper};
use waypost::{Server, Settings, Telemetry, app, shutdown_signal, spawn_background, terminate};

#[tokio::main]
async fn main() -> ExitCode {
    let started = Instant::now();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("waypost: {e}");
            return ExitCode::FAILURE;
        }
    };
    let telemetry = match Telemetry::init(&settings) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("waypost: cannot set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };
    let logger = telemetry.logger().clone();

    spawn_background(logger.clone(), retention_sweeper(Arc::clone(logger.sink()), RETENTION_PERIOD));

    let server = match Server::bind(&settings.host, settings.port).await {
        Ok(server) => server,
        Err(e) => {
            logger.error_with("Server error", json!({ "error": e.to_string() }));
            terminate(&logger, 1);
        }
    };

    logger.info_with(
        format!("Server running on {}:{}", settings.host, server.local_addr().port()),
        json!({
            "environment": settings.mode.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
            "pid": std::process::id(),
            "platform": std::env::consts::OS,
        }),
    );

    let pipeline = Arc::new(app::build(&settings, logger.clone(), started));
    let shutdown_logger = logger.clone();
    server
        .serve_with_shutdown(pipeline, async move {
            let signal = shutdown_signal().await;
            shutdown_logger.info(format!("{signal} received, shutting down gracefully"));
        })
        .await;

    telemetry.shutdown();
    ExitCode::SUCCESS
}
