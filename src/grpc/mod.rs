//! gRPC server component.
//!
//! # Data Flow
//! ```text
//! TCP connection (HTTP/2)
//!     → server.rs (tonic serve loop owned by the GrpcServer component)
//!     → request timeout, keepalive
//!     → caller-supplied services (tonic::service::Routes)
//! ```

pub mod server;

pub use server::{GrpcServer, GrpcServerError};
