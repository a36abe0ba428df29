//! The capability contract every managed subsystem implements.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Error type crossing the component contract.
///
/// Components report whatever error they like; the orchestrator hands it back
/// to its caller untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A subsystem whose lifetime is driven by an [`App`](crate::lifecycle::App).
///
/// # Contract
/// - `start` brings the subsystem to a ready-to-serve state. Readiness may be
///   approximate (a server may report success once its listener is bound).
/// - `stop` releases everything acquired by `start` and must not block
///   indefinitely; each implementer enforces its own local timeout.
/// - `name` is used for diagnostics only, never for ordering or lookup.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Bring the subsystem up.
    async fn start(&self, ctx: &Context) -> Result<(), BoxError>;

    /// Bring the subsystem down.
    async fn stop(&self, ctx: &Context) -> Result<(), BoxError>;

    /// Human-readable identifier.
    fn name(&self) -> String;
}

/// Deadline and cancellation signal handed to each component call.
///
/// The orchestrator fires the signal once its own deadline elapses. Components
/// are trusted to observe it; nothing forces them to.
#[derive(Debug, Clone)]
pub struct Context {
    deadline: Instant,
    cancel: CancellationToken,
}

impl Context {
    /// Create a context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Instant at which the surrounding operation gives up.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed or the context was cancelled.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Resolves once the deadline passes or the context is cancelled.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
    }

    /// Fire the cancellation signal.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let ctx = Context::with_timeout(Duration::from_secs(5));
        assert!(ctx.remaining() <= Duration::from_secs(5));
        assert!(ctx.remaining() > Duration::from_secs(4));
        assert!(!ctx.is_done());
    }

    #[tokio::test]
    async fn test_done_after_deadline() {
        let ctx = Context::with_timeout(Duration::from_millis(20));
        ctx.done().await;
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancel_is_shared_between_clones() {
        let ctx = Context::with_timeout(Duration::from_secs(60));
        let observer = ctx.clone();
        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), observer.done())
            .await
            .expect("clone should observe cancellation");
        assert!(observer.is_done());
    }
}
