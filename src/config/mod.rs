//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! $CONFIG_FILE_PATH (default ./.config/config.json)
//!     → loader.rs (read, parse JSON or TOML by extension)
//!     → validation.rs (semantic checks, all errors collected)
//!     → ServiceConfig (validated, immutable)
//!     → handed to App, HttpServer, observability
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from_env, load_from_file, ConfigError};
pub use schema::{
    GrpcServerConfig, HttpServerConfig, LifecycleConfig, ObservabilityConfig, ServiceConfig,
};
pub use validation::{Validate, ValidationError};
