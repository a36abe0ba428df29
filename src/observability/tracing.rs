//! Distributed trace export.
//!
//! # Responsibilities
//! - Bridge `tracing` spans to OpenTelemetry through a reloadable layer
//! - Install an OpenTelemetry tracer provider as a lifecycle component
//! - Flush and shut the provider down on stop
//!
//! # Design Decisions
//! - The subscriber is installed once at process start with an empty trace
//!   slot; the exporter component fills it on start and empties it on stop
//! - The span exporter (OTLP, Jaeger, in-memory) is supplied by the caller
//! - W3C Trace Context and Baggage propagators are installed globally
//! - Stop timeout is surfaced as an error

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::noop::NoopTracerProvider;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{SdkTracerProvider, SpanExporter};
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing_subscriber::{reload, Layer, Registry};

use crate::config::ObservabilityConfig;
use crate::lifecycle::{BoxError, Context, Lifecycle};

/// Instrumentation scope name of the bridged tracer.
const TRACER_NAME: &str = "layout";

/// Type-erased layer held in the trace slot.
pub type DynLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Subscriber layer whose contents are swapped at runtime.
pub type TraceLayer = reload::Layer<Option<DynLayer>, Registry>;

/// Handle to the trace slot of an installed subscriber.
#[derive(Clone)]
pub struct TraceLayerHandle(reload::Handle<Option<DynLayer>, Registry>);

impl fmt::Debug for TraceLayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLayerHandle").finish_non_exhaustive()
    }
}

impl TraceLayerHandle {
    fn set(&self, layer: Option<DynLayer>) -> Result<(), TraceExporterError> {
        self.0.reload(layer)?;
        Ok(())
    }
}

/// Create an empty trace slot and the handle used to fill it.
///
/// The layer must sit directly on the [`Registry`].
pub fn trace_layer() -> (TraceLayer, TraceLayerHandle) {
    let (layer, handle) = reload::Layer::new(None);
    (layer, TraceLayerHandle(handle))
}

/// Errors raised by [`TraceExporter`].
#[derive(Debug, Error)]
pub enum TraceExporterError {
    #[error("trace exporter is already running")]
    AlreadyRunning,

    #[error("span exporter was consumed by an earlier start")]
    ExporterConsumed,

    #[error("failed to swap trace layer: {0}")]
    Layer(#[from] reload::Error),

    #[error("failed to flush spans: {0}")]
    Flush(String),

    #[error("failed to shut down tracer provider: {0}")]
    Shutdown(String),

    #[error("tracer provider shutdown timeout after {0:?}")]
    StopTimeout(Duration),
}

/// Lifecycle component owning the OpenTelemetry tracer provider.
pub struct TraceExporter<E> {
    service_name: String,
    exporter: Mutex<Option<E>>,
    layer: Option<TraceLayerHandle>,
    provider: Mutex<Option<SdkTracerProvider>>,
}

impl<E: SpanExporter + 'static> TraceExporter<E> {
    /// Create a component batching spans of `service_name` into `exporter`.
    pub fn new(service_name: impl Into<String>, exporter: E) -> Self {
        Self {
            service_name: service_name.into(),
            exporter: Mutex::new(Some(exporter)),
            layer: None,
            provider: Mutex::new(None),
        }
    }

    /// Create a component named after the configured service.
    pub fn from_config(config: &ObservabilityConfig, exporter: E) -> Self {
        Self::new(config.service_name.clone(), exporter)
    }

    /// Bridge `tracing` spans into the provider while running.
    pub fn with_layer(mut self, handle: TraceLayerHandle) -> Self {
        self.layer = Some(handle);
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Whether a provider is installed.
    pub fn is_running(&self) -> bool {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Export every finished span now instead of on the next batch.
    pub fn force_flush(&self) -> Result<(), TraceExporterError> {
        let provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        match provider.as_ref() {
            Some(provider) => provider
                .force_flush()
                .map_err(|e| TraceExporterError::Flush(e.to_string())),
            None => Ok(()),
        }
    }

    fn install(&self) -> Result<(), TraceExporterError> {
        let mut slot = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(TraceExporterError::AlreadyRunning);
        }
        let exporter = self
            .exporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TraceExporterError::ExporterConsumed)?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                Resource::builder()
                    .with_service_name(self.service_name.clone())
                    .build(),
            )
            .build();

        if let Some(handle) = &self.layer {
            let tracer = provider.tracer(TRACER_NAME);
            handle.set(Some(Box::new(
                tracing_opentelemetry::layer().with_tracer(tracer),
            )))?;
        }

        global::set_tracer_provider(provider.clone());
        global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]));

        *slot = Some(provider);
        tracing::info!(service = %self.service_name, "Trace exporter installed");
        Ok(())
    }
}

#[async_trait]
impl<E: SpanExporter + 'static> Lifecycle for TraceExporter<E> {
    async fn start(&self, _ctx: &Context) -> Result<(), BoxError> {
        self.install()?;
        Ok(())
    }

    async fn stop(&self, ctx: &Context) -> Result<(), BoxError> {
        let provider = self
            .provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(provider) = provider else {
            return Ok(());
        };

        if let Some(handle) = &self.layer {
            handle.set(None)?;
        }
        global::set_tracer_provider(NoopTracerProvider::new());

        // Shutdown flushes the batch and blocks until the exporter is done.
        let budget = ctx.remaining();
        let shutdown =
            tokio::task::spawn_blocking(move || provider.shutdown().map_err(|e| e.to_string()));

        match tokio::time::timeout(budget, shutdown).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(service = %self.service_name, "Trace exporter stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(TraceExporterError::Shutdown(e).into()),
            Ok(Err(e)) => Err(TraceExporterError::Shutdown(e.to_string()).into()),
            Err(_) => Err(TraceExporterError::StopTimeout(budget).into()),
        }
    }

    fn name(&self) -> String {
        format!("Trace Exporter for {}", self.service_name)
    }
}
