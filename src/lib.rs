//! Service lifecycle orchestration library.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller
//!     │  add_component(metrics) → add_component(db) → add_component(http)
//!     ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                            App                               │
//!   │                                                              │
//!   │  start():  metrics.start → db.start → http.start             │
//!   │            (one background task, raced against deadline)     │
//!   │                                                              │
//!   │  stop():   http.stop → db.stop → metrics.stop                │
//!   │            (reverse order, same race)                        │
//!   └──────────────────────────────────────────────────────────────┘
//!                 │ Lifecycle { start, stop, name }
//!        ┌────────┴─────────┬──────────────────┬─────────────────┐
//!        ▼                  ▼                  ▼                 ▼
//!   http::HttpServer   grpc::GrpcServer   observability::   your components
//!                                         PrometheusExporter,
//!                                         TraceExporter
//! ```

// Core
pub mod lifecycle;

// Components and ambient concerns
pub mod config;
pub mod grpc;
pub mod http;
pub mod observability;

pub use config::ServiceConfig;
pub use grpc::GrpcServer;
pub use http::HttpServer;
pub use lifecycle::{App, AppError, Context, Lifecycle};
