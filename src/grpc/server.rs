//! gRPC server setup and lifecycle.
//!
//! # Responsibilities
//! - Serve caller-supplied tonic routes on a bound listener
//! - Apply request timeout and HTTP/2 keepalive settings
//! - Drain in-flight calls on stop, within a local budget
//!
//! # Design Decisions
//! - Services are passed in as `tonic::service::Routes`, so any generated
//!   service can be mounted without this module knowing its type
//! - Start reports ready once the listener is bound and the serve loop has
//!   survived `startup_grace_ms`
//! - Stop timeout is logged, the serve task is aborted and stop still
//!   succeeds: a stuck stream must not block the rest of the shutdown

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;

use crate::config::GrpcServerConfig;
use crate::lifecycle::{BoxError, Context, Lifecycle};

/// Errors reported by [`GrpcServer`].
#[derive(Debug, Error)]
pub enum GrpcServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC server is already running")]
    AlreadyRunning,

    #[error("failed to prepare incoming connections: {0}")]
    Incoming(String),

    #[error("gRPC server exited during startup")]
    ExitedEarly,

    #[error("gRPC server error: {0}")]
    Serve(#[source] tonic::transport::Error),

    #[error("gRPC server task failed: {0}")]
    Task(String),
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

/// gRPC server managed as a lifecycle component.
pub struct GrpcServer {
    config: GrpcServerConfig,
    routes: Routes,
    running: Mutex<Option<Running>>,
}

impl GrpcServer {
    /// Create a server for the given services.
    pub fn new(config: GrpcServerConfig, routes: Routes) -> Self {
        Self {
            config,
            routes,
            running: Mutex::new(None),
        }
    }

    /// Address the server is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|r| r.local_addr)
    }

    /// Whether the serve loop is running.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    pub fn config(&self) -> &GrpcServerConfig {
        &self.config
    }

    fn builder(&self) -> Server {
        let keepalive = match self.config.keepalive_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Server::builder()
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .http2_keepalive_interval(keepalive)
            .http2_keepalive_timeout(Some(Duration::from_secs(
                self.config.keepalive_timeout_secs,
            )))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Lifecycle for GrpcServer {
    async fn start(&self, ctx: &Context) -> Result<(), BoxError> {
        if self.is_running() {
            return Err(GrpcServerError::AlreadyRunning.into());
        }

        let listener = TcpListener::bind(self.config.bind_address.as_str())
            .await
            .map_err(|source| GrpcServerError::Bind {
                address: self.config.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|e| GrpcServerError::Incoming(e.to_string()))?;

        let mut builder = self.builder();
        let router = builder.add_routes(self.routes.clone());

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let mut task = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(incoming, async move { signal.cancelled().await })
                .await
        });

        let grace = Duration::from_millis(self.config.startup_grace_ms).min(ctx.remaining());
        tokio::select! {
            joined = &mut task => {
                let err = match joined {
                    Ok(Ok(())) => GrpcServerError::ExitedEarly,
                    Ok(Err(e)) => GrpcServerError::Serve(e),
                    Err(e) => GrpcServerError::Task(e.to_string()),
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

        tracing::info!(address = %local_addr, "gRPC server listening");
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
                tracing::info!(address = %running.local_addr, "gRPC server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(GrpcServerError::Serve(e).into()),
            Ok(Err(e)) => Err(GrpcServerError::Task(e.to_string()).into()),
            Err(_) => {
                running.task.abort();
                tracing::warn!(
                    address = %running.local_addr,
                    budget_ms = budget.as_millis() as u64,
                    "gRPC server did not drain in time, aborted"
                );
                Ok(())
            }
        }
    }

    fn name(&self) -> String {
        format!("gRPC Server at {}", self.config.bind_address)
    }
}
