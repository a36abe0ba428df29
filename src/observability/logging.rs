//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Select log level from `RUST_LOG` or config
//! - Select pretty or JSON output
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Installation failures are returned, not panicked on
//! - An empty trace slot is installed with every subscriber; the returned
//!   handle lets a trace exporter fill it later

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::observability::tracing::{trace_layer, TraceLayerHandle};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("unknown log format '{0}'")]
    Format(String),

    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the level filter: `RUST_LOG` when set, else the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level).map_err(|source| LoggingError::Filter {
        filter: config.log_level.clone(),
        source,
    })
}

/// Install the global subscriber described by `config`.
///
/// Returns the handle to the subscriber's trace slot.
pub fn init(config: &ObservabilityConfig) -> Result<TraceLayerHandle, LoggingError> {
    let filter = env_filter(config)?;
    let (traces, handle) = trace_layer();
    let registry = tracing_subscriber::registry().with(traces).with(filter);

    match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        "pretty" => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        other => return Err(LoggingError::Format(other.to_string())),
    }

    Ok(handle)
}
