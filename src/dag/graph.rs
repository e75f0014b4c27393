// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::dag::step_id::StepId;
use crate::errors::Result;
use crate::manifest::{Manifest, ManifestEntry};

/// Position of a node in the graph arena.
pub type StepIndex = usize;

/// What a node in the graph stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A pipeline step defined by a manifest entry.
    Step,
    /// An external snapshot resource; always a leaf.
    External,
    /// Referenced as a dependency but never defined. Only valid until
    /// validation, which reports it as an unresolved dependency.
    Undefined,
}

/// Arena node. Edges are stored as indices in both directions.
#[derive(Debug, Clone)]
pub struct StepNode {
    pub id: StepId,
    pub kind: NodeKind,
    /// Declared dependencies, in source order, without repeats.
    pub dependencies: Vec<StepIndex>,
    /// Nodes that list this one as a dependency.
    pub dependents: Vec<StepIndex>,
    /// Manifest file of the first definition, if known.
    pub source: Option<PathBuf>,
}

/// A step id defined twice with different dependency sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateDefinition {
    pub step: StepId,
    pub first: Vec<StepId>,
    pub second: Vec<StepId>,
}

/// In-memory dependency graph built from a manifest.
///
/// The graph is built once and never changes shape afterwards. It may still
/// be invalid (cycles, unresolved dependencies, conflicting definitions);
/// see [`crate::dag::validate`].
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<StepNode>,
    by_id: HashMap<String, StepIndex>,
    /// Pipeline steps in manifest definition order.
    steps: Vec<StepIndex>,
    duplicates: Vec<DuplicateDefinition>,
}

impl Graph {
    /// Build a graph from an already-loaded [`Manifest`].
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        Self::build(manifest.entries().iter().cloned())
    }

    /// Build a graph from ordered manifest entries.
    ///
    /// Fails immediately on the first malformed identifier. Conflicting
    /// re-definitions and unresolved dependencies are recorded and left for
    /// validation to report.
    pub fn build(entries: impl IntoIterator<Item = ManifestEntry>) -> Result<Self> {
        let mut graph = Graph::default();

        for entry in entries {
            let id = StepId::parse(&entry.id)?;

            let mut seen = HashSet::new();
            let mut deps = Vec::with_capacity(entry.dependencies.len());
            for raw in &entry.dependencies {
                let dep = StepId::parse(raw)?;
                if seen.insert(dep.to_string()) {
                    deps.push(dep);
                }
            }

            if id.is_external() {
                warn!(
                    step = %id,
                    "snapshot listed as a manifest step; treating it as an external leaf"
                );
                graph.intern(id);
                continue;
            }

            let index = match graph.by_id.get(&id.to_string()).copied() {
                Some(existing) if graph.nodes[existing].kind == NodeKind::Step => {
                    graph.record_redefinition(existing, deps);
                    continue;
                }
                Some(placeholder) => {
                    let node = &mut graph.nodes[placeholder];
                    node.kind = NodeKind::Step;
                    node.source = entry.source.clone();
                    placeholder
                }
                None => graph.push_node(id.clone(), NodeKind::Step, entry.source.clone()),
            };
            graph.steps.push(index);

            for dep in deps {
                let dep_index = graph.intern(dep);
                graph.nodes[index].dependencies.push(dep_index);
                graph.nodes[dep_index].dependents.push(index);
            }
        }

        debug!(
            steps = graph.steps.len(),
            nodes = graph.nodes.len(),
            "dependency graph built"
        );

        Ok(graph)
    }

    fn push_node(&mut self, id: StepId, kind: NodeKind, source: Option<PathBuf>) -> StepIndex {
        let index = self.nodes.len();
        self.by_id.insert(id.to_string(), index);
        self.nodes.push(StepNode {
            id,
            kind,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            source,
        });
        index
    }

    /// Look up a node by id, creating an external or placeholder node.
    fn intern(&mut self, id: StepId) -> StepIndex {
        if let Some(&index) = self.by_id.get(&id.to_string()) {
            return index;
        }
        let kind = if id.is_external() {
            NodeKind::External
        } else {
            NodeKind::Undefined
        };
        self.push_node(id, kind, None)
    }

    fn record_redefinition(&mut self, existing: StepIndex, deps: Vec<StepId>) {
        let node = &self.nodes[existing];
        let first: Vec<StepId> = node
            .dependencies
            .iter()
            .map(|&d| self.nodes[d].id.clone())
            .collect();

        let first_set: HashSet<&StepId> = first.iter().collect();
        let second_set: HashSet<&StepId> = deps.iter().collect();

        if first_set == second_set {
            debug!(step = %node.id, "step defined again with identical dependencies");
            return;
        }

        warn!(step = %node.id, "step defined again with different dependencies");
        self.duplicates.push(DuplicateDefinition {
            step: node.id.clone(),
            first,
            second: deps,
        });
    }

    /// Number of nodes, including externals and placeholders.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of pipeline steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn node(&self, index: StepIndex) -> &StepNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (StepIndex, &StepNode)> {
        self.nodes.iter().enumerate()
    }

    /// Pipeline step indices in manifest definition order.
    pub fn step_indices(&self) -> &[StepIndex] {
        &self.steps
    }

    /// Pipeline steps in manifest definition order.
    pub fn steps(&self) -> impl Iterator<Item = &StepId> {
        self.steps.iter().map(|&i| &self.nodes[i].id)
    }

    /// External snapshot resources referenced by the manifest.
    pub fn externals(&self) -> impl Iterator<Item = &StepId> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::External)
            .map(|n| &n.id)
    }

    pub fn index_of(&self, id: &str) -> Option<StepIndex> {
        self.by_id.get(id).copied()
    }

    /// Whether `id` is a defined pipeline step.
    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id)
            .is_some_and(|i| self.nodes[i].kind == NodeKind::Step)
    }

    /// Declared dependencies of a step, exactly as listed in the manifest
    /// (source order, repeats removed). Empty for unknown ids.
    pub fn dependencies_of(&self, id: &str) -> Vec<&StepId> {
        self.index_of(id)
            .map(|i| {
                self.nodes[i]
                    .dependencies
                    .iter()
                    .map(|&d| &self.nodes[d].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct dependents of a node.
    pub fn dependents_of(&self, id: &str) -> Vec<&StepId> {
        self.index_of(id)
            .map(|i| {
                self.nodes[i]
                    .dependents
                    .iter()
                    .map(|&d| &self.nodes[d].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dependencies that are themselves pipeline steps (snapshots and
    /// undefined placeholders excluded).
    pub fn pipeline_dependencies(&self, index: StepIndex) -> impl Iterator<Item = StepIndex> + '_ {
        self.nodes[index]
            .dependencies
            .iter()
            .copied()
            .filter(|&d| self.nodes[d].kind == NodeKind::Step)
    }

    /// Conflicting re-definitions seen while building.
    pub fn duplicates(&self) -> &[DuplicateDefinition] {
        &self.duplicates
    }
}
