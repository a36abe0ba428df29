//! Ordered startup and shutdown of registered components.
//!
//! # Responsibilities
//! - Keep the ordered component registry
//! - Start components in registration order, stop them in reverse
//! - Race each whole sequence against a deadline
//! - Fail fast on the first component error
//!
//! # Design Decisions
//! - Components run one at a time, never concurrently
//! - No rollback: components started before a failure stay started
//! - On deadline the driving task is detached, not aborted. It may keep
//!   running after the timeout has been reported; treat a timeout as
//!   "unknown final state". The context handed to components is cancelled
//!   so cooperative components can bail out.
//! - One caller at a time: overlapping start/stop calls are rejected

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::config::LifecycleConfig;
use crate::lifecycle::component::{Context, Lifecycle};
use crate::lifecycle::error::{AppError, AppResult, Operation, Phase};
use crate::observability::metrics;

/// Start deadline used when none is configured.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Stop deadline used when none is configured.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrator owning the ordered set of application components.
pub struct App {
    /// Registered components, in start order.
    components: Vec<Arc<dyn Lifecycle>>,
    /// Start deadline; zero means default.
    start_timeout: Duration,
    /// Stop deadline; zero means default.
    stop_timeout: Duration,
    /// Current orchestrator phase.
    phase: Mutex<Phase>,
    /// Span every orchestrator and component event is recorded in.
    span: tracing::Span,
}

impl App {
    /// Create an empty app with default deadlines.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            start_timeout: Duration::ZERO,
            stop_timeout: Duration::ZERO,
            phase: Mutex::new(Phase::Idle),
            span: tracing::info_span!("app"),
        }
    }

    /// Create an empty app with deadlines taken from configuration.
    pub fn from_config(config: &LifecycleConfig) -> Self {
        let mut app = Self::new();
        app.set_start_timeout(Duration::from_secs(config.start_timeout_secs));
        app.set_stop_timeout(Duration::from_secs(config.stop_timeout_secs));
        app
    }

    /// Record all lifecycle events inside `span` instead of the default one.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Append a component to the registry.
    ///
    /// Registering the same component twice is allowed; it is then started
    /// and stopped twice.
    pub fn add_component(&mut self, component: Arc<dyn Lifecycle>) -> AppResult<()> {
        self.ensure_open(component.as_ref())?;
        tracing::debug!(
            parent: &self.span,
            component = %component.name(),
            position = self.components.len(),
            "Component registered"
        );
        self.components.push(component);
        Ok(())
    }

    /// Append several components, preserving their order.
    pub fn add_components<I>(&mut self, components: I) -> AppResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Lifecycle>>,
    {
        for component in components {
            self.add_component(component)?;
        }
        Ok(())
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component is registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Names of the registered components, in start order.
    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Effective start deadline.
    pub fn start_timeout(&self) -> Duration {
        effective(self.start_timeout, DEFAULT_START_TIMEOUT)
    }

    /// Set the start deadline. Zero restores the default.
    pub fn set_start_timeout(&mut self, timeout: Duration) {
        self.start_timeout = timeout;
    }

    /// Effective stop deadline.
    pub fn stop_timeout(&self) -> Duration {
        effective(self.stop_timeout, DEFAULT_STOP_TIMEOUT)
    }

    /// Set the stop deadline. Zero restores the default.
    pub fn set_stop_timeout(&mut self, timeout: Duration) {
        self.stop_timeout = timeout;
    }

    /// Start every component in registration order within the start deadline.
    pub async fn start(&self) -> AppResult<()> {
        self.start_within(self.start_timeout()).await
    }

    /// Start every component within `timeout` (zero means default).
    pub async fn start_within(&self, timeout: Duration) -> AppResult<()> {
        let timeout = effective(timeout, DEFAULT_START_TIMEOUT);
        self.execute(Operation::Start, timeout).await
    }

    /// Stop every component in reverse registration order within the stop deadline.
    pub async fn stop(&self) -> AppResult<()> {
        self.stop_within(self.stop_timeout()).await
    }

    /// Stop every component within `timeout` (zero means default).
    pub async fn stop_within(&self, timeout: Duration) -> AppResult<()> {
        let timeout = effective(timeout, DEFAULT_STOP_TIMEOUT);
        self.execute(Operation::Stop, timeout).await
    }

    async fn execute(&self, operation: Operation, timeout: Duration) -> AppResult<()> {
        let mut transition = self.begin(operation)?;

        tracing::info!(
            parent: &self.span,
            operation = %operation,
            components = self.components.len(),
            timeout_ms = timeout.as_millis() as u64,
            "{}",
            match operation {
                Operation::Start => "Starting app",
                Operation::Stop => "Stopping app",
            }
        );

        let result = self.race(operation, timeout).await;
        transition.complete(&result);
        metrics::record_app_operation(operation, &result);

        match &result {
            Ok(()) => tracing::info!(
                parent: &self.span,
                operation = %operation,
                "{}",
                match operation {
                    Operation::Start => "App started",
                    Operation::Stop => "App stopped",
                }
            ),
            Err(e) => tracing::error!(
                parent: &self.span,
                operation = %operation,
                error = %e,
                "App {} failed",
                operation
            ),
        }

        result
    }

    /// Run the component sequence in a background task and race it against `timeout`.
    async fn race(&self, operation: Operation, timeout: Duration) -> AppResult<()> {
        if self.components.is_empty() {
            return Ok(());
        }

        let mut components = self.components.clone();
        if operation == Operation::Stop {
            components.reverse();
        }

        let ctx = Context::with_timeout(timeout);
        let sequence = drive(operation, components, ctx.clone()).instrument(self.span.clone());
        let task = tokio::spawn(sequence);

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AppError::TaskAborted {
                operation,
                reason: join_error.to_string(),
            }),
            Err(_elapsed) => {
                // The join handle is dropped here: the task is detached and keeps running.
                ctx.cancel();
                tracing::warn!(
                    parent: &self.span,
                    operation = %operation,
                    timeout_ms = timeout.as_millis() as u64,
                    "Deadline elapsed, component task left running"
                );
                Err(AppError::timeout(operation))
            }
        }
    }

    fn ensure_open(&mut self, component: &dyn Lifecycle) -> AppResult<()> {
        let phase = self.phase.get_mut().unwrap_or_else(PoisonError::into_inner);
        if *phase == Phase::Idle {
            Ok(())
        } else {
            Err(AppError::RegistrationClosed {
                name: component.name(),
            })
        }
    }

    fn begin(&self, operation: Operation) -> AppResult<Transition<'_>> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        let allowed = match operation {
            Operation::Start => *phase == Phase::Idle,
            Operation::Stop => matches!(
                *phase,
                Phase::Idle
                    | Phase::Running
                    | Phase::Failed(Operation::Start)
                    | Phase::TimedOut(Operation::Start)
            ),
        };
        if !allowed {
            return Err(AppError::InvalidPhase {
                operation,
                phase: *phase,
            });
        }

        *phase = match operation {
            Operation::Start => Phase::Starting,
            Operation::Stop => Phase::Stopping,
        };

        Ok(Transition {
            phase: &self.phase,
            operation,
            outcome: None,
        })
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("components", &self.component_names())
            .field("start_timeout", &self.start_timeout())
            .field("stop_timeout", &self.stop_timeout())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Records the phase an operation ends in, even if the caller drops the future.
struct Transition<'a> {
    phase: &'a Mutex<Phase>,
    operation: Operation,
    outcome: Option<Phase>,
}

impl Transition<'_> {
    fn complete(&mut self, result: &AppResult<()>) {
        self.outcome = Some(match result {
            Ok(()) => match self.operation {
                Operation::Start => Phase::Running,
                Operation::Stop => Phase::Stopped,
            },
            Err(e) if e.is_timeout() => Phase::TimedOut(self.operation),
            Err(_) => Phase::Failed(self.operation),
        });
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        // Abandoned mid-flight: the components' state is as unknown as after a failure.
        let next = self.outcome.unwrap_or(Phase::Failed(self.operation));
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Call `operation` on each component in turn, stopping at the first error.
async fn drive(
    operation: Operation,
    components: Vec<Arc<dyn Lifecycle>>,
    ctx: Context,
) -> AppResult<()> {
    for component in components {
        let name = component.name();
        tracing::info!(
            component = %name,
            "{}",
            match operation {
                Operation::Start => "Starting component",
                Operation::Stop => "Stopping component",
            }
        );

        let started = Instant::now();
        let result = match operation {
            Operation::Start => component.start(&ctx).await,
            Operation::Stop => component.stop(&ctx).await,
        };
        metrics::record_component_operation(operation, &name, started, result.is_ok());

        if let Err(e) = result {
            tracing::error!(
                component = %name,
                operation = %operation,
                error = %e,
                "Component failed"
            );
            return Err(AppError::Component(e));
        }

        tracing::debug!(
            component = %name,
            operation = %operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Component done"
        );
    }
    Ok(())
}

fn effective(timeout: Duration, default: Duration) -> Duration {
    if timeout.is_zero() {
        default
    } else {
        timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::component::BoxError;
    use async_trait::async_trait;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{self, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::Layer;

    struct Noop(&'static str);

    #[async_trait]
    impl Lifecycle for Noop {
        async fn start(&self, _ctx: &Context) -> Result<(), BoxError> {
            Ok(())
        }

        async fn stop(&self, _ctx: &Context) -> Result<(), BoxError> {
            Ok(())
        }

        fn name(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_default_timeouts() {
        let mut app = App::new();
        assert_eq!(app.start_timeout(), Duration::from_secs(30));
        assert_eq!(app.stop_timeout(), Duration::from_secs(30));

        app.set_start_timeout(Duration::from_secs(5));
        app.set_stop_timeout(Duration::from_millis(250));
        assert_eq!(app.start_timeout(), Duration::from_secs(5));
        assert_eq!(app.stop_timeout(), Duration::from_millis(250));

        app.set_start_timeout(Duration::ZERO);
        assert_eq!(app.start_timeout(), DEFAULT_START_TIMEOUT);
    }

    #[test]
    fn test_from_config() {
        let config = LifecycleConfig {
            start_timeout_secs: 7,
            stop_timeout_secs: 0,
        };
        let app = App::from_config(&config);
        assert_eq!(app.start_timeout(), Duration::from_secs(7));
        assert_eq!(app.stop_timeout(), DEFAULT_STOP_TIMEOUT);
    }

    #[test]
    fn test_registration_keeps_order_and_duplicates() {
        let mut app = App::new();
        let a: Arc<dyn Lifecycle> = Arc::new(Noop("a"));
        app.add_component(a.clone()).unwrap();
        app.add_components([Arc::new(Noop("b")) as Arc<dyn Lifecycle>, a])
            .unwrap();
        assert_eq!(app.len(), 3);
        assert_eq!(app.component_names(), vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_app_starts_and_stops() {
        let app = App::new();
        assert!(app.is_empty());
        app.start().await.unwrap();
        assert_eq!(app.phase(), Phase::Running);
        app.stop().await.unwrap();
        assert_eq!(app.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_registration_closed_after_start() {
        let mut app = App::new();
        app.add_component(Arc::new(Noop("a"))).unwrap();
        app.start().await.unwrap();

        let err = app.add_component(Arc::new(Noop("late"))).unwrap_err();
        assert!(matches!(err, AppError::RegistrationClosed { ref name } if name == "late"));
        assert_eq!(app.len(), 1);
    }

    #[tokio::test]
    async fn test_phase_rules() {
        let app = App::new();

        app.start().await.unwrap();
        let err = app.start().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidPhase {
                operation: Operation::Start,
                phase: Phase::Running
            }
        ));

        app.stop().await.unwrap();
        let err = app.stop().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidPhase {
                operation: Operation::Stop,
                phase: Phase::Stopped
            }
        ));
    }

    /// Records each event's message with the names of its enclosing spans.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(String, Vec<String>)>>>);

    impl Captured {
        fn recorded_in(&self, message: &str, span: &str) -> bool {
            self.0
                .lock()
                .unwrap()
                .iter()
                .any(|(m, spans)| m == message && spans.iter().any(|s| s == span))
        }
    }

    struct Message(String);

    impl Visit for Message {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S> Layer<S> for Captured
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &tracing::Event<'_>, ctx: layer::Context<'_, S>) {
            let mut message = Message(String::new());
            event.record(&mut message);
            let spans = ctx
                .event_scope(event)
                .map(|scope| {
                    scope
                        .from_root()
                        .map(|s| s.name().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            self.0.lock().unwrap().push((message.0, spans));
        }
    }

    #[tokio::test]
    async fn test_events_recorded_in_supplied_span() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut app = App::new().with_span(tracing::info_span!("billing_app"));
        app.add_component(Arc::new(Noop("ledger"))).unwrap();
        app.start().await.unwrap();
        app.stop().await.unwrap();

        assert!(captured.recorded_in("Starting app", "billing_app"));
        assert!(captured.recorded_in("Starting component", "billing_app"));
        assert!(captured.recorded_in("App started", "billing_app"));
        assert!(captured.recorded_in("Stopping component", "billing_app"));
        assert!(captured.recorded_in("App stopped", "billing_app"));
        assert!(!captured.recorded_in("Starting component", "app"));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut app = App::new();
        app.add_component(Arc::new(Noop("a"))).unwrap();
        app.stop().await.unwrap();
        assert_eq!(app.phase(), Phase::Stopped);
    }
}
