//! Orchestrator error definitions.

use std::fmt;

use thiserror::Error;

use crate::lifecycle::component::BoxError;

/// Which half of the lifecycle an error or phase refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    Stop,
}

impl Operation {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Stop => "stop",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator-level state.
///
/// ```text
/// Idle → Starting → Running | Failed(Start) | TimedOut(Start)
///      → Stopping → Stopped | Failed(Stop)  | TimedOut(Stop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed(Operation),
    TimedOut(Operation),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Starting => f.write_str("starting"),
            Phase::Running => f.write_str("running"),
            Phase::Stopping => f.write_str("stopping"),
            Phase::Stopped => f.write_str("stopped"),
            Phase::Failed(op) => write!(f, "failed during {}", op),
            Phase::TimedOut(op) => write!(f, "timed out during {}", op),
        }
    }
}

/// Errors returned by [`App`](crate::lifecycle::App).
#[derive(Debug, Error)]
pub enum AppError {
    /// A component's start or stop failed; the component's error verbatim.
    #[error(transparent)]
    Component(BoxError),

    /// The start deadline elapsed before every component had started.
    /// The final state of the components is unknown.
    #[error("start timeout")]
    StartTimeout,

    /// The stop deadline elapsed before every component had stopped.
    #[error("shutdown timeout")]
    StopTimeout,

    /// A component was registered after the app left the idle phase.
    #[error("cannot register {name}: registration is closed once the app has been started")]
    RegistrationClosed { name: String },

    /// Start or stop was called in a phase that does not allow it.
    #[error("cannot {operation} app while it is {phase}")]
    InvalidPhase { operation: Operation, phase: Phase },

    /// The background task driving the components panicked or was cancelled.
    #[error("{operation} task aborted: {reason}")]
    TaskAborted { operation: Operation, reason: String },
}

impl AppError {
    /// Timeout variant for the given operation.
    pub fn timeout(operation: Operation) -> Self {
        match operation {
            Operation::Start => AppError::StartTimeout,
            Operation::Stop => AppError::StopTimeout,
        }
    }

    /// Whether this is a start or stop deadline error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::StartTimeout | AppError::StopTimeout)
    }

    /// Borrow the component error, if this is one.
    pub fn component(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            AppError::Component(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// Take back ownership of the component error, if this is one.
    pub fn into_component(self) -> Option<BoxError> {
        match self {
            AppError::Component(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for orchestrator operations.
pub type AppResult<T> = Result<T, AppError>;
