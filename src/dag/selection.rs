// src/dag/selection.rs

//! Choosing which steps of a validated DAG a run should execute.
//!
//! Steps are matched by regex against their full id. By default every
//! upstream pipeline dependency of a match is pulled in as well, so the
//! selection can run on its own. `downstream` additionally pulls in
//! everything that depends on a match; `only` disables the upstream
//! closure; `exclude` removes steps after both expansions.

use std::collections::VecDeque;

use regex::RegexSet;
use tracing::{debug, warn};

use crate::dag::graph::{NodeKind, StepIndex};
use crate::dag::validate::Dag;
use crate::errors::Result;

/// User-facing selection knobs (mirrors the CLI flags).
#[derive(Debug, Clone, Default)]
pub struct SelectionOptions {
    /// Regexes matched against step ids. Empty selects every step.
    pub patterns: Vec<String>,
    /// Regexes of steps to drop after expansion.
    pub exclude: Vec<String>,
    /// Also select transitive dependents of matched steps.
    pub downstream: bool,
    /// Do not add upstream dependencies of matched steps.
    pub only: bool,
}

/// The set of pipeline steps taking part in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    members: Vec<bool>,
    count: usize,
}

impl Selection {
    /// Every pipeline step of the DAG.
    pub fn all(dag: &Dag) -> Self {
        let mut members = vec![false; dag.node_count()];
        for &i in dag.step_indices() {
            members[i] = true;
        }
        Self {
            members,
            count: dag.len(),
        }
    }

    pub fn resolve(dag: &Dag, options: &SelectionOptions) -> Result<Self> {
        let include = RegexSet::new(&options.patterns)?;
        let exclude = RegexSet::new(&options.exclude)?;

        let mut members = vec![false; dag.node_count()];
        let mut matched: Vec<StepIndex> = Vec::new();

        for &i in dag.step_indices() {
            let id = dag.node(i).id.to_string();
            if options.patterns.is_empty() || include.is_match(&id) {
                members[i] = true;
                matched.push(i);
            }
        }

        if matched.is_empty() {
            warn!(patterns = ?options.patterns, "no steps match the given patterns");
        }

        if options.downstream {
            walk(dag, &matched, &mut members, |i| dag.node(i).dependents.clone());
        }

        if !options.only {
            let seeds: Vec<StepIndex> = (0..members.len()).filter(|&i| members[i]).collect();
            walk(dag, &seeds, &mut members, |i| dag.pipeline_dependencies(i).collect());
        }

        if !options.exclude.is_empty() {
            for &i in dag.step_indices() {
                if members[i] && exclude.is_match(&dag.node(i).id.to_string()) {
                    debug!(step = %dag.node(i).id, "excluded from selection");
                    members[i] = false;
                }
            }
        }

        let count = members.iter().filter(|&&m| m).count();
        debug!(selected = count, total = dag.len(), "step selection resolved");

        Ok(Self { members, count })
    }

    pub fn contains(&self, index: StepIndex) -> bool {
        self.members.get(index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Selected steps in manifest definition order.
    pub fn indices<'a>(&'a self, dag: &'a Dag) -> impl Iterator<Item = StepIndex> + 'a {
        dag.step_indices()
            .iter()
            .copied()
            .filter(move |&i| self.contains(i))
    }
}

/// Breadth-first closure from `seeds` along `next`, marking pipeline steps.
fn walk<F>(dag: &Dag, seeds: &[StepIndex], members: &mut [bool], next: F)
where
    F: Fn(StepIndex) -> Vec<StepIndex>,
{
    let mut queue: VecDeque<StepIndex> = seeds.iter().copied().collect();
    while let Some(current) = queue.pop_front() {
        for n in next(current) {
            if dag.node(n).kind == NodeKind::Step && !members[n] {
                members[n] = true;
                queue.push_back(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::graph::Graph;
    use crate::dag::validate::validate;
    use crate::manifest::ManifestEntry;

    fn dag() -> Dag {
        let entries = vec![
            ManifestEntry::new("meadow://wid/1/wid", ["snapshot://wid/1/wid.csv"]),
            ManifestEntry::new("garden://wid/1/wid", ["meadow://wid/1/wid"]),
            ManifestEntry::new("grapher://wid/1/wid", ["garden://wid/1/wid"]),
            ManifestEntry::new("meadow://lis/1/lis", ["snapshot://lis/1/lis.csv"]),
            ManifestEntry::new("garden://lis/1/lis", ["meadow://lis/1/lis"]),
        ];
        validate(Graph::build(entries).unwrap()).unwrap()
    }

    fn selected(dag: &Dag, sel: &Selection) -> Vec<String> {
        sel.indices(dag).map(|i| dag.node(i).id.to_string()).collect()
    }

    #[test]
    fn no_patterns_selects_everything() {
        let dag = dag();
        let sel = Selection::resolve(&dag, &SelectionOptions::default()).unwrap();
        assert_eq!(sel, Selection::all(&dag));
        assert_eq!(sel.len(), 5);
    }

    #[test]
    fn match_pulls_in_upstream_dependencies() {
        let dag = dag();
        let opts = SelectionOptions {
            patterns: vec!["garden://wid".to_string()],
            ..Default::default()
        };
        let sel = Selection::resolve(&dag, &opts).unwrap();
        assert_eq!(selected(&dag, &sel), vec!["meadow://wid/1/wid", "garden://wid/1/wid"]);
    }

    #[test]
    fn only_skips_upstream_closure() {
        let dag = dag();
        let opts = SelectionOptions {
            patterns: vec!["garden://wid".to_string()],
            only: true,
            ..Default::default()
        };
        let sel = Selection::resolve(&dag, &opts).unwrap();
        assert_eq!(selected(&dag, &sel), vec!["garden://wid/1/wid"]);
    }

    #[test]
    fn downstream_adds_dependents() {
        let dag = dag();
        let opts = SelectionOptions {
            patterns: vec!["^meadow://wid".to_string()],
            downstream: true,
            only: true,
            ..Default::default()
        };
        let sel = Selection::resolve(&dag, &opts).unwrap();
        assert_eq!(
            selected(&dag, &sel),
            vec!["meadow://wid/1/wid", "garden://wid/1/wid", "grapher://wid/1/wid"]
        );
    }

    #[test]
    fn exclude_applies_after_expansion() {
        let dag = dag();
        let opts = SelectionOptions {
            patterns: vec!["wid".to_string()],
            exclude: vec!["^grapher://".to_string()],
            ..Default::default()
        };
        let sel = Selection::resolve(&dag, &opts).unwrap();
        assert_eq!(selected(&dag, &sel), vec!["meadow://wid/1/wid", "garden://wid/1/wid"]);
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let dag = dag();
        let opts = SelectionOptions {
            patterns: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            Selection::resolve(&dag, &opts),
            Err(crate::errors::EtlDagError::SelectionError(_))
        ));
    }
}
