//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (app.rs):
//!     add_component(A) → add_component(B) → add_component(C)
//!
//! Startup (app.rs):
//!     start() → spawn task: A.start → B.start → C.start
//!             → race task against start deadline
//!
//! Shutdown (app.rs):
//!     stop()  → spawn task: C.stop → B.stop → A.stop
//!             → race task against stop deadline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller runs stop()
//! ```
//!
//! # Design Decisions
//! - Ordering is registration order, never inferred from dependencies
//! - Fail fast: the first component error aborts the sequence
//! - No compensation: a failed start leaves earlier components running
//! - Deadline expiry detaches the sequence instead of cancelling it

pub mod app;
pub mod component;
pub mod error;
pub mod signals;

pub use app::{App, DEFAULT_START_TIMEOUT, DEFAULT_STOP_TIMEOUT};
pub use component::{BoxError, Context, Lifecycle};
pub use error::{AppError, AppResult, Operation, Phase};
