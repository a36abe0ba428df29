//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (service id, addresses, log settings)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{
    GrpcServerConfig, HttpServerConfig, LifecycleConfig, ObservabilityConfig, ServiceConfig,
};

/// Log levels accepted by `observability.log_level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Formats accepted by `observability.log_format`.
pub const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Semantic checks run after deserialization.
pub trait Validate {
    /// Push every problem found into `errors`, prefixing field names with `prefix`.
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<ValidationError>);

    /// Validate the whole value.
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        self.collect_errors("", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn field(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn check_socket_addr(prefix: &str, name: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field(prefix, name), "must not be empty"));
    } else if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field(prefix, name),
            format!("'{}' is not a valid socket address", value),
        ));
    }
}

impl Validate for ServiceConfig {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<ValidationError>) {
        self.lifecycle.collect_errors(&field(prefix, "lifecycle"), errors);
        self.http.collect_errors(&field(prefix, "http"), errors);
        self.observability
            .collect_errors(&field(prefix, "observability"), errors);
    }
}

impl Validate for LifecycleConfig {
    // Any value is acceptable: 0 selects the default deadline.
    fn collect_errors(&self, _prefix: &str, _errors: &mut Vec<ValidationError>) {}
}

impl Validate for HttpServerConfig {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<ValidationError>) {
        check_socket_addr(prefix, "bind_address", &self.bind_address, errors);

        if !(10..=99).contains(&self.service_id) {
            errors.push(ValidationError::new(
                field(prefix, "service_id"),
                format!("must be between 10 and 99, got {}", self.service_id),
            ));
        }

        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                field(prefix, "request_timeout_secs"),
                "must be greater than 0",
            ));
        }

        if self.stop_timeout_secs == 0 {
            errors.push(ValidationError::new(
                field(prefix, "stop_timeout_secs"),
                "must be greater than 0",
            ));
        }
    }
}

impl Validate for GrpcServerConfig {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<ValidationError>) {
        check_socket_addr(prefix, "bind_address", &self.bind_address, errors);

        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                field(prefix, "request_timeout_secs"),
                "must be greater than 0",
            ));
        }

        if self.keepalive_interval_secs > 0 && self.keepalive_timeout_secs == 0 {
            errors.push(ValidationError::new(
                field(prefix, "keepalive_timeout_secs"),
                "must be greater than 0 when keepalive pings are enabled",
            ));
        }

        if self.stop_timeout_secs == 0 {
            errors.push(ValidationError::new(
                field(prefix, "stop_timeout_secs"),
                "must be greater than 0",
            ));
        }
    }
}

impl Validate for ObservabilityConfig {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<ValidationError>) {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            errors.push(ValidationError::new(
                field(prefix, "log_level"),
                format!("unknown level '{}'", self.log_level),
            ));
        }

        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            errors.push(ValidationError::new(
                field(prefix, "log_format"),
                format!("expected one of {:?}, got '{}'", LOG_FORMATS, self.log_format),
            ));
        }

        if self.metrics_enabled {
            check_socket_addr(prefix, "metrics_address", &self.metrics_address, errors);
        }

        if self.service_name.trim().is_empty() {
            errors.push(ValidationError::new(
                field(prefix, "service_name"),
                "must not be empty",
            ));
        }
    }
}
