// src/engine/mod.rs

//! Execution engine for etldag.
//!
//! The [`Coordinator`] walks a validated DAG with the
//! [`crate::dag::Scheduler`], hands ready steps to a
//! [`crate::exec::StepHandler`] under a concurrency limit, and collects a
//! [`RunReport`].
//!
//! Each running step is a tokio task that reports back over an mpsc
//! channel of [`StepFinished`] events; only the coordinator loop touches
//! scheduler state.

use crate::dag::StepIndex;
use crate::exec::{Artifact, ExecutionError};

/// Execution knobs for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Maximum number of handlers executing at once (>= 1).
    pub workers: usize,
    /// Cancel not-yet-started steps after the first failure.
    pub fail_fast: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            fail_fast: false,
        }
    }
}

/// Sent by a step task when its handler returns (or panics).
#[derive(Debug)]
pub struct StepFinished {
    pub index: StepIndex,
    pub outcome: Result<Artifact, ExecutionError>,
}

pub mod coordinator;
pub mod report;

pub use coordinator::{CancelHandle, Coordinator};
pub use report::{RunReport, SkipReason, StepReport};
