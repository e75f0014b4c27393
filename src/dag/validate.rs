// src/dag/validate.rs

//! Cycle and validity checks.
//!
//! Validation never stops at the first problem: manifests are edited by
//! hand and often carry several mistakes at once, so every violation found
//! is collected into a single [`ValidationReport`].

use std::fmt;

use tracing::{debug, info};

use crate::dag::graph::{DuplicateDefinition, Graph, NodeKind, StepIndex};
use crate::dag::step_id::StepId;
use crate::errors::{EtlDagError, Result};

/// A single problem found in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The same step id was defined with two different dependency sets.
    DuplicateStepDefinition {
        step: StepId,
        first: Vec<StepId>,
        second: Vec<StepId>,
    },
    /// `step` depends on `missing`, which is neither a snapshot nor a
    /// defined step.
    UnresolvedDependency { step: StepId, missing: StepId },
    /// Dependency path that returns to its first step, e.g. `[A, B, A]`
    /// for "A depends on B, B depends on A".
    CyclicDependency { cycle: Vec<StepId> },
}

fn join_ids(ids: &[StepId], sep: &str) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateStepDefinition {
                step,
                first,
                second,
            } => write!(
                f,
                "DuplicateStepDefinition: '{step}' defined with [{}] and again with [{}]",
                join_ids(first, ", "),
                join_ids(second, ", ")
            ),
            Violation::UnresolvedDependency { step, missing } => write!(
                f,
                "UnresolvedDependency: '{step}' depends on undefined step '{missing}'"
            ),
            Violation::CyclicDependency { cycle } => {
                write!(f, "CyclicDependency: {}", join_ids(cycle, " -> "))
            }
        }
    }
}

/// Every violation found by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn cycles(&self) -> impl Iterator<Item = &[StepId]> {
        self.violations.iter().filter_map(|v| match v {
            Violation::CyclicDependency { cycle } => Some(cycle.as_slice()),
            _ => None,
        })
    }

    pub fn unresolved(&self) -> impl Iterator<Item = (&StepId, &StepId)> {
        self.violations.iter().filter_map(|v| match v {
            Violation::UnresolvedDependency { step, missing } => Some((step, missing)),
            _ => None,
        })
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &StepId> {
        self.violations.iter().filter_map(|v| match v {
            Violation::DuplicateStepDefinition { step, .. } => Some(step),
            _ => None,
        })
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {violation}")?;
        }
        Ok(())
    }
}

/// A graph that passed validation: acyclic, every dependency resolved,
/// no conflicting definitions.
///
/// Only [`validate`] constructs this; the scheduler and coordinator accept
/// nothing else.
#[derive(Debug, Clone)]
pub struct Dag {
    graph: Graph,
}

impl std::ops::Deref for Dag {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        &self.graph
    }
}

impl TryFrom<Graph> for Dag {
    type Error = EtlDagError;

    fn try_from(graph: Graph) -> Result<Self> {
        validate(graph)
    }
}

/// Run every check and either hand back a [`Dag`] or fail with
/// [`EtlDagError::Validation`] carrying all violations.
pub fn validate(graph: Graph) -> Result<Dag> {
    let report = check(&graph);

    if report.is_empty() {
        info!(steps = graph.len(), "manifest validated");
        Ok(Dag { graph })
    } else {
        Err(EtlDagError::Validation(report))
    }
}

/// Collect all violations without consuming the graph.
pub fn check(graph: &Graph) -> ValidationReport {
    let mut violations = Vec::new();

    violations.extend(duplicate_violations(graph.duplicates()));
    violations.extend(unresolved_violations(graph));
    violations.extend(cycle_violations(graph));

    debug!(violations = violations.len(), "validation passes finished");

    ValidationReport { violations }
}

fn duplicate_violations(duplicates: &[DuplicateDefinition]) -> Vec<Violation> {
    duplicates
        .iter()
        .map(|d| Violation::DuplicateStepDefinition {
            step: d.step.clone(),
            first: d.first.clone(),
            second: d.second.clone(),
        })
        .collect()
}

fn unresolved_violations(graph: &Graph) -> Vec<Violation> {
    let mut out = Vec::new();
    for &step in graph.step_indices() {
        let node = graph.node(step);
        for &dep in &node.dependencies {
            let dep_node = graph.node(dep);
            if dep_node.kind == NodeKind::Undefined {
                out.push(Violation::UnresolvedDependency {
                    step: node.id.clone(),
                    missing: dep_node.id.clone(),
                });
            }
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first traversal over pipeline dependencies with an explicit
/// recursion stack. Every back edge yields one cycle.
fn cycle_violations(graph: &Graph) -> Vec<Violation> {
    let mut marks = vec![Mark::Unvisited; graph.node_count()];
    // Position of each on-stack node in `path`.
    let mut stack_pos: Vec<Option<usize>> = vec![None; graph.node_count()];
    let mut path: Vec<StepIndex> = Vec::new();
    let mut cycles = Vec::new();

    for &root in graph.step_indices() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // (node, index of the next dependency to look at)
        let mut frames: Vec<(StepIndex, usize)> = vec![(root, 0)];
        marks[root] = Mark::OnStack;
        stack_pos[root] = Some(path.len());
        path.push(root);

        while let Some(frame) = frames.last_mut() {
            let (node, next) = *frame;
            let deps = &graph.node(node).dependencies;

            if next == deps.len() {
                frames.pop();
                path.pop();
                marks[node] = Mark::Done;
                stack_pos[node] = None;
                continue;
            }
            frame.1 += 1;

            let dep = deps[next];
            if graph.node(dep).kind != NodeKind::Step {
                continue;
            }

            match marks[dep] {
                Mark::Unvisited => {
                    marks[dep] = Mark::OnStack;
                    stack_pos[dep] = Some(path.len());
                    path.push(dep);
                    frames.push((dep, 0));
                }
                Mark::OnStack => {
                    let start = stack_pos[dep].unwrap_or(0);
                    let mut cycle: Vec<StepId> = path[start..]
                        .iter()
                        .map(|&i| graph.node(i).id.clone())
                        .collect();
                    cycle.push(graph.node(dep).id.clone());
                    cycles.push(Violation::CyclicDependency { cycle });
                }
                Mark::Done => {}
            }
        }
    }

    cycles
}
