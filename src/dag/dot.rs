// src/dag/dot.rs

//! Graphviz export of a (selected) DAG.

use std::collections::HashMap;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dag::graph::StepIndex;
use crate::dag::selection::Selection;
use crate::dag::validate::Dag;

/// Render the selected steps, plus the snapshots they read, in DOT format.
///
/// Edge direction follows data flow: `dependency -> dependent`.
pub fn to_dot(dag: &Dag, selection: &Selection) -> String {
    let mut graph: DiGraph<String, &str> = DiGraph::new();
    let mut nodes: HashMap<StepIndex, NodeIndex> = HashMap::new();

    for i in selection.indices(dag) {
        nodes.insert(i, graph.add_node(dag.node(i).id.to_string()));
    }

    for i in selection.indices(dag) {
        let target = nodes[&i];
        for &dep in &dag.node(i).dependencies {
            let source = match nodes.get(&dep) {
                Some(&n) => n,
                None if dag.node(dep).id.is_external() => {
                    let n = graph.add_node(dag.node(dep).id.to_string());
                    nodes.insert(dep, n);
                    n
                }
                // Unselected pipeline dependency: not part of this picture.
                None => continue,
            };
            graph.add_edge(source, target, "");
        }
    }

    format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
}
