//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On SIGTERM (sent by process supervisors and the Kubernetes control plane)
//! or SIGINT (Ctrl-C) the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve_with_shutdown`], so `main` can flush the
//!    log sink and exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::body::CompletionBody;
use crate::error::{AppError, Error};
use crate::middleware::Pipeline;
use crate::request::Incoming;

/// Largest request body accepted, in bytes.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// A bound HTTP listener.
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Resolve `host:port` and bind the first address it yields.
    ///
    /// Port `0` binds an ephemeral port; see [`local_addr`](Self::local_addr).
    pub async fn bind(host: &str, port: u16) -> Result<Self, Error> {
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::Resolve(format!("{host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| Error::Resolve(format!("{host}:{port}")))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| Error::bind(addr, e))?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept connections and run every request through `pipeline` until
    /// `signal` resolves, then drain in-flight connections.
    ///
    /// Returns whatever `signal` resolved to.
    pub async fn serve_with_shutdown<F>(self, pipeline: Arc<Pipeline>, signal: F) -> F::Output
    where
        F: Future,
    {
        info!(addr = %self.addr, "listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        let reason = loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                reason = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break reason;
                }

                res = self.listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = Arc::clone(&pipeline);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let pipeline = Arc::clone(&pipeline);
                            async move { dispatch(pipeline, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(peer = %remote_addr, "connection closed with error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        };

        while tasks.join_next().await.is_some() {}

        info!("server stopped");
        reason
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads the body (up to [`BODY_LIMIT`]) and runs the pipeline. All failures
/// become responses, so hyper never sees an error.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<CompletionBody>, Infallible> {
    let (parts, body) = req.into_parts();

    let incoming = match Limited::new(body, BODY_LIMIT).collect().await {
        Ok(collected) => Incoming::from_parts(parts, collected.to_bytes(), remote_addr),
        Err(e) => {
            let rejection = if e.downcast_ref::<LengthLimitError>().is_some() {
                AppError::named("PayloadTooLargeError", "request entity too large")
                    .with_status(StatusCode::PAYLOAD_TOO_LARGE)
                    .operational(true)
            } else {
                AppError::named("BadRequestError", format!("request aborted: {e}"))
                    .with_status(StatusCode::BAD_REQUEST)
                    .operational(true)
            };
            Incoming::from_parts(parts, Bytes::new(), remote_addr).reject(rejection)
        }
    };

    Ok(pipeline.handle(incoming).await.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives and returns
/// its name (`"SIGTERM"` or `"SIGINT"`).
///
/// On Windows only Ctrl-C is available.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // Never resolves: the SIGTERM arm is disabled off Unix.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => "SIGINT",
        () = sigterm => "SIGTERM",
    }
}
