//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a service built on the lifecycle orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Orchestrator deadlines.
    pub lifecycle: LifecycleConfig,

    /// HTTP server component settings.
    pub http: HttpServerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Orchestrator deadlines.
///
/// A value of 0 means "use the default" (30 seconds).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Deadline for starting every component, in seconds.
    pub start_timeout_secs: u64,

    /// Deadline for stopping every component, in seconds.
    pub stop_timeout_secs: u64,
}

/// HTTP server component configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Two-digit service identifier used to derive masked error indexes.
    pub service_id: u32,

    /// Expose internal error messages in responses (never in production).
    pub show_unknown_errors: bool,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// How long start waits for the serve loop to fail before reporting ready.
    pub startup_grace_ms: u64,

    /// Graceful shutdown budget in seconds.
    pub stop_timeout_secs: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            service_id: 10,
            show_unknown_errors: false,
            request_timeout_secs: 30,
            startup_grace_ms: 250,
            stop_timeout_secs: 10,
        }
    }
}

/// gRPC server component configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GrpcServerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// HTTP/2 keepalive ping interval in seconds; 0 disables pings.
    pub keepalive_interval_secs: u64,

    /// How long to wait for a keepalive ack, in seconds.
    pub keepalive_timeout_secs: u64,

    /// How long start waits for the serve loop to fail before reporting ready.
    pub startup_grace_ms: u64,

    /// Graceful shutdown budget in seconds.
    pub stop_timeout_secs: u64,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            request_timeout_secs: 30,
            keepalive_interval_secs: 0,
            keepalive_timeout_secs: 20,
            startup_grace_ms: 250,
            stop_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable the Prometheus exporter component.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Service name attached to exported traces.
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            service_name: "layout".to_string(),
        }
    }
}
