//! HTTP server component.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum serve loop owned by the HttpServer component)
//!     → TraceLayer, request ID (x-request-id, UUID v4)
//!     → errors.rs (error envelope, X-Trace-Id header)
//!     → TimeoutLayer
//!     → caller-supplied routes
//! ```

pub mod errors;
pub mod server;

pub use errors::{ApiError, ErrorBody, ErrorPolicy, ErrorResponse, TRACE_ID_HEADER};
pub use server::{HttpServer, HttpServerError};
