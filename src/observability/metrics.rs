//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define lifecycle metrics (per-component and per-app outcomes)
//! - Expose a Prometheus-compatible endpoint as a lifecycle component
//!
//! # Metrics
//! - `lifecycle_component_operations_total` (counter): operation, component, outcome
//! - `lifecycle_component_duration_seconds` (histogram): operation, component
//! - `lifecycle_app_operations_total` (counter): operation, outcome
//!
//! # Design Decisions
//! - Outcome label is `ok`, `error` or `timeout`
//! - The exporter's stop never fails: aborting the scrape task is enough

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ObservabilityConfig;
use crate::lifecycle::{AppResult, BoxError, Context, Lifecycle, Operation};

/// Record the outcome and duration of one component start or stop.
pub fn record_component_operation(
    operation: Operation,
    component: &str,
    started: Instant,
    ok: bool,
) {
    let outcome = if ok { "ok" } else { "error" };

    counter!(
        "lifecycle_component_operations_total",
        "operation" => operation.as_str(),
        "component" => component.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        "lifecycle_component_duration_seconds",
        "operation" => operation.as_str(),
        "component" => component.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

/// Record the outcome of a whole app start or stop.
pub fn record_app_operation(operation: Operation, result: &AppResult<()>) {
    let outcome = match result {
        Ok(()) => "ok",
        Err(e) if e.is_timeout() => "timeout",
        Err(_) => "error",
    };

    counter!(
        "lifecycle_app_operations_total",
        "operation" => operation.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Errors raised by [`PrometheusExporter`].
#[derive(Debug, Error)]
pub enum MetricsExporterError {
    #[error("invalid metrics address '{0}'")]
    Address(String),

    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),

    #[error("a metrics recorder is already installed in this process")]
    RecorderInstalled,

    #[error("Prometheus exporter is already running")]
    AlreadyRunning,
}

/// Lifecycle component serving `/metrics` for Prometheus.
///
/// Start installs the process-wide metrics recorder, which cannot be removed
/// again; a second exporter in the same process fails to start.
pub struct PrometheusExporter {
    address: SocketAddr,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PrometheusExporter {
    /// Create an exporter listening on `address`.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            task: Mutex::new(None),
        }
    }

    /// Create an exporter from the observability section.
    pub fn from_config(config: &ObservabilityConfig) -> Result<Self, MetricsExporterError> {
        let address = config
            .metrics_address
            .parse()
            .map_err(|_| MetricsExporterError::Address(config.metrics_address.clone()))?;
        Ok(Self::new(address))
    }

    /// Address the exporter listens on.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn install(&self) -> Result<(), MetricsExporterError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Err(MetricsExporterError::AlreadyRunning);
        }

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.address)
            .build()?;
        metrics::set_global_recorder(recorder)
            .map_err(|_| MetricsExporterError::RecorderInstalled)?;

        let address = self.address;
        *task = Some(tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(address = %address, error = ?e, "Prometheus exporter failed");
            }
        }));

        tracing::info!(address = %self.address, "Metrics exporter listening");
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for PrometheusExporter {
    async fn start(&self, _ctx: &Context) -> Result<(), BoxError> {
        self.install()?;
        Ok(())
    }

    async fn stop(&self, _ctx: &Context) -> Result<(), BoxError> {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
            tracing::info!(address = %self.address, "Metrics exporter stopped");
        }
        Ok(())
    }

    fn name(&self) -> String {
        format!("Prometheus Exporter at {}", self.address)
    }
}
