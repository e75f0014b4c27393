// tests/property_scheduler.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use etldag::dag::{Dag, Scheduler, Selection, StepState, topological_order, wavefronts};
use etldag_test_utils::builders::ManifestBuilder;

fn step_name(i: usize) -> String {
    format!("garden://prop/2024-01-01/step_{i}")
}

// Acyclic by construction: step N may only depend on steps 0..N-1. The
// definition order is shuffled so it does not match the dependency order.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = Dag> {
    (1..=max_steps).prop_flat_map(|n| {
        let deps = proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n);
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        (deps, order).prop_map(move |(raw_deps, order)| {
            let deps: Vec<Vec<String>> = raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut valid: Vec<usize> = potential
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|d| d % i.max(1))
                        .collect::<HashSet<_>>()
                        .into_iter()
                        .collect();
                    valid.sort_unstable();
                    valid.into_iter().map(step_name).collect()
                })
                .collect();

            let mut builder = ManifestBuilder::new();
            for i in order {
                let dep_refs: Vec<&str> = deps[i].iter().map(String::as_str).collect();
                builder = builder.step(&step_name(i), &dep_refs);
            }
            builder.dag()
        })
    })
}

fn deps_of(dag: &Dag, id: &str) -> Vec<String> {
    dag.dependencies_of(id).iter().map(|d| d.to_string()).collect()
}

proptest! {
    #[test]
    fn topological_order_places_dependencies_first(dag in dag_strategy(12)) {
        let order: Vec<String> = topological_order(&dag, &Selection::all(&dag))
            .iter()
            .map(ToString::to_string)
            .collect();
        prop_assert_eq!(order.len(), dag.len());

        let pos: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();
        for step in &order {
            for dep in deps_of(&dag, step) {
                prop_assert!(pos[dep.as_str()] < pos[step.as_str()]);
            }
        }

        let again: Vec<String> = topological_order(&dag, &Selection::all(&dag))
            .iter()
            .map(ToString::to_string)
            .collect();
        prop_assert_eq!(order, again);
    }

    #[test]
    fn wavefront_dependencies_sit_in_earlier_waves(dag in dag_strategy(12)) {
        let waves = wavefronts(&dag, &Selection::all(&dag));
        let mut wave_of = HashMap::new();
        for (w, wave) in waves.iter().enumerate() {
            for step in wave {
                prop_assert!(wave_of.insert(step.to_string(), w).is_none());
            }
        }
        prop_assert_eq!(wave_of.len(), dag.len());

        for (step, &w) in &wave_of {
            for dep in deps_of(&dag, step) {
                prop_assert!(wave_of[&dep] < w);
            }
        }
    }

    #[test]
    fn failures_never_let_a_descendant_succeed(
        dag in dag_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..4),
    ) {
        let failing: HashSet<String> = failing.into_iter().map(step_name).collect();
        let mut scheduler = Scheduler::new(&dag, &Selection::all(&dag));

        while let Some(i) = scheduler.pop_ready() {
            prop_assert!(scheduler.mark_running(i));
            if failing.contains(&dag.node(i).id.to_string()) {
                scheduler.complete_failure(i);
            } else {
                scheduler.complete_success(i);
            }
        }
        prop_assert!(scheduler.is_finished());

        for &i in dag.step_indices() {
            let state = scheduler.state_of(i).unwrap();
            let dep_states: Vec<StepState> = dag
                .pipeline_dependencies(i)
                .map(|d| scheduler.state_of(d).unwrap())
                .collect();
            match state {
                StepState::Succeeded | StepState::Failed => {
                    prop_assert!(dep_states.iter().all(|s| *s == StepState::Succeeded));
                }
                StepState::Skipped => {
                    prop_assert!(dep_states.iter().any(|s| *s != StepState::Succeeded));
                }
                other => prop_assert!(false, "non-terminal state {:?}", other),
            }
        }
    }
}
