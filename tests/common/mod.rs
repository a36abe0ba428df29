//! Shared probe components for lifecycle integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use layout::lifecycle::{BoxError, Context, Lifecycle};
use thiserror::Error;

/// Error produced by a failing probe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProbeError {
    pub component: String,
    pub message: String,
}

/// Shared, ordered record of every call the probes receive.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`, prefix stripped.
    pub fn calls(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_owned))
            .collect()
    }

    pub fn starts(&self) -> Vec<String> {
        self.calls("start:")
    }

    pub fn stops(&self) -> Vec<String> {
        self.calls("stop:")
    }

    /// Highest number of probe calls observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a probe does when called.
#[derive(Clone, Debug)]
pub enum Behavior {
    Succeed,
    Fail(&'static str),
    Delay(Duration),
    FailAfter(Duration, &'static str),
    Hang,
    /// Wait for the context to be done, then record `cancelled:<name>`.
    AwaitDone,
    Panic,
}

/// A component that records its calls and behaves as configured.
pub struct Probe {
    name: String,
    journal: Journal,
    on_start: Behavior,
    on_stop: Behavior,
}

impl Probe {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            on_start: Behavior::Succeed,
            on_stop: Behavior::Succeed,
        }
    }

    pub fn on_start(mut self, behavior: Behavior) -> Self {
        self.on_start = behavior;
        self
    }

    pub fn on_stop(mut self, behavior: Behavior) -> Self {
        self.on_stop = behavior;
        self
    }

    pub fn shared(self) -> Arc<dyn Lifecycle> {
        Arc::new(self)
    }

    async fn act(&self, behavior: &Behavior, ctx: &Context) -> Result<(), BoxError> {
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(self.error(message)),
            Behavior::Delay(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
            Behavior::FailAfter(d, message) => {
                tokio::time::sleep(*d).await;
                Err(self.error(message))
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Behavior::AwaitDone => {
                ctx.done().await;
                self.journal.record(format!("cancelled:{}", self.name));
                Ok(())
            }
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }

    fn error(&self, message: &str) -> BoxError {
        Box::new(ProbeError {
            component: self.name.clone(),
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl Lifecycle for Probe {
    async fn start(&self, ctx: &Context) -> Result<(), BoxError> {
        self.journal.record(format!("start:{}", self.name));
        self.journal.enter();
        let result = self.act(&self.on_start, ctx).await;
        self.journal.exit();
        result
    }

    async fn stop(&self, ctx: &Context) -> Result<(), BoxError> {
        self.journal.record(format!("stop:{}", self.name));
        self.journal.enter();
        let result = self.act(&self.on_stop, ctx).await;
        self.journal.exit();
        result
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
