//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Wrap caller-supplied Axum routes with the standard middleware stack
//! - Bind the listener and run the serve loop on start
//! - Drain connections gracefully on stop, within a local budget
//!
//! # Design Decisions
//! - Start reports ready once the listener is bound and the serve loop has
//!   survived `startup_grace_ms`; readiness is not proven by a request
//! - Stop timeout is surfaced as an error and the serve task is aborted

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::{middleware, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::HttpServerConfig;
use crate::http::errors::{error_envelope, ErrorPolicy};
use crate::lifecycle::{BoxError, Context, Lifecycle};

/// Errors reported by [`HttpServer`].
#[derive(Debug, Error)]
pub enum HttpServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server is already running")]
    AlreadyRunning,

    #[error("HTTP server exited during startup")]
    ExitedEarly,

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("HTTP server task failed: {0}")]
    Task(String),

    #[error("stop timeout after {0:?}")]
    StopTimeout(Duration),
}

/// A serve loop in flight.
struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

/// HTTP server managed as a lifecycle component.
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
    running: Mutex<Option<Running>>,
}

impl HttpServer {
    /// Create a server for `routes` with the standard middleware stack applied.
    pub fn new(config: HttpServerConfig, routes: Router) -> Self {
        let router = Self::build_router(&config, routes);
        Self {
            config,
            router,
            running: Mutex::new(None),
        }
    }

    /// Wrap the routes with tracing, request IDs, the error envelope and timeouts.
    #[allow(deprecated)]
    fn build_router(config: &HttpServerConfig, routes: Router) -> Router {
        routes.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn_with_state(
                    ErrorPolicy::from(config),
                    error_envelope,
                ))
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
        )
    }

    /// Address the server is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|r| r.local_addr)
    }

    /// Whether the serve loop is running.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &HttpServerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Lifecycle for HttpServer {
    async fn start(&self, ctx: &Context) -> Result<(), BoxError> {
        if self.is_running() {
            return Err(HttpServerError::AlreadyRunning.into());
        }

        let listener = TcpListener::bind(self.config.bind_address.as_str())
            .await
            .map_err(|source| HttpServerError::Bind {
                address: self.config.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let app = self.router.clone();
        let mut task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        let grace = Duration::from_millis(self.config.startup_grace_ms).min(ctx.remaining());
        tokio::select! {
            joined = &mut task => {
                let err = match joined {
                    Ok(Ok(())) => HttpServerError::ExitedEarly,
                    Ok(Err(e)) => HttpServerError::Serve(e),
                    Err(e) => HttpServerError::Task(e.to_string()),
                };
                return Err(err.into());
            }
            _ = tokio::time::sleep(grace) => {}
        }

        *self.lock() = Some(Running {
            local_addr,
            shutdown,
            task,
        });

        tracing::info!(address = %local_addr, "HTTP server listening");
        Ok(())
    }

    async fn stop(&self, ctx: &Context) -> Result<(), BoxError> {
        let running = self.lock().take();
        let Some(mut running) = running else {
            return Ok(());
        };

        running.shutdown.cancel();
        let budget = Duration::from_secs(self.config.stop_timeout_secs).min(ctx.remaining());

        match tokio::time::timeout(budget, &mut running.task).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(address = %running.local_addr, "HTTP server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(HttpServerError::Serve(e).into()),
            Ok(Err(e)) => Err(HttpServerError::Task(e.to_string()).into()),
            Err(_) => {
                running.task.abort();
                tracing::warn!(
                    address = %running.local_addr,
                    budget_ms = budget.as_millis() as u64,
                    "HTTP server did not drain in time, aborted"
                );
                Err(HttpServerError::StopTimeout(budget).into())
            }
        }
    }

    fn name(&self) -> String {
        format!("HTTP Server at {}", self.config.bind_address)
    }
}
