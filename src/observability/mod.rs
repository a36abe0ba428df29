//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! App and components produce:
//!     → logging.rs (structured log events inside the app span)
//!     → metrics.rs (per-component and per-app counters, histograms)
//!     → tracing.rs (spans bridged to OpenTelemetry while the exporter runs)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (PrometheusExporter component)
//!     → caller-supplied span exporter (TraceExporter component)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics go through the `metrics` facade; recording is a no-op until the
//!   exporter component installs a recorder
//! - Exporters are lifecycle components, started and stopped in order
//! - The trace slot is part of the subscriber from the start and stays empty
//!   until the trace exporter fills it

pub mod logging;
pub mod metrics;
pub mod tracing;
