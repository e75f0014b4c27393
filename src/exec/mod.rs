// src/exec/mod.rs

//! Step execution layer.
//!
//! - [`handler`] defines the [`StepHandler`] seam, the [`StepContext`] a
//!   handler receives, [`Artifact`] and [`ExecutionError`].
//! - [`command`] provides [`CommandHandler`], which runs a configured shell
//!   command per step using `tokio::process::Command`.
//! - [`template`] renders `{placeholder}` templates for commands and
//!   artifacts.

pub mod command;
pub mod handler;
pub mod template;

pub use command::CommandHandler;
pub use handler::{Artifact, CancelSignal, ExecutionError, StepContext, StepFuture, StepHandler};
