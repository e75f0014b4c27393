// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`step_id`] parses `channel://namespace/version/short_name` ids.
//! - [`graph`] builds the arena graph from manifest entries.
//! - [`validate`] checks for duplicates, unresolved dependencies and
//!   cycles, and produces a [`Dag`].
//! - [`selection`] picks the steps a run should execute.
//! - [`scheduler`] contains the Kahn scheduler that decides which steps are
//!   ready, plus total-order and wavefront helpers.
//! - [`state`] defines the per-run [`StepState`].
//! - [`dot`] renders a DAG for Graphviz.

pub mod dot;
pub mod graph;
pub mod scheduler;
pub mod selection;
pub mod state;
pub mod step_id;
pub mod validate;

pub use graph::{Graph, NodeKind, StepIndex, StepNode};
pub use scheduler::{topological_order, wavefronts, Scheduler};
pub use selection::{Selection, SelectionOptions};
pub use state::StepState;
pub use step_id::{Channel, StepId};
pub use validate::{validate, Dag, ValidationReport, Violation};
