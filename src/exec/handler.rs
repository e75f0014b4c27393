// src/exec/handler.rs

//! Pluggable step handler abstraction.
//!
//! The coordinator never knows how a step is executed. Fetching snapshots,
//! running transformations and writing tables all live behind
//! [`StepHandler`]. Production code uses [`super::CommandHandler`]; tests
//! provide their own implementation that records calls and decides
//! outcomes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::watch;

use crate::dag::StepId;

/// Reference to whatever a successful step produced (a path, a table
/// name, a URI). Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact(String);

impl Artifact {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure of a single step. Local to that step: it never aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("command exited with status {code}")]
    CommandFailed { code: i32 },

    #[error("failed to launch step: {0}")]
    Launch(String),

    #[error("step cancelled")]
    Cancelled,

    #[error("step handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExecutionError::Failed(message.into())
    }
}

/// Cooperative cancellation flag handed to every step.
///
/// Handlers that can stop early should poll [`CancelSignal::is_cancelled`]
/// or await [`CancelSignal::cancelled`]; the coordinator never interrupts
/// a running handler on its own.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// sending side goes away without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything a handler needs to execute one step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub step: StepId,
    /// Artifacts of the step's pipeline dependencies, in declared order.
    pub dependencies: Vec<(StepId, Artifact)>,
    /// External snapshot resources the step reads.
    pub snapshots: Vec<StepId>,
    pub cancel: CancelSignal,
}

/// Boxed future returned by [`StepHandler::execute`].
pub type StepFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Artifact, ExecutionError>> + Send + 'a>>;

/// Trait abstracting how a single step is executed.
pub trait StepHandler: Send + Sync {
    fn execute(&self, ctx: StepContext) -> StepFuture<'_>;
}
