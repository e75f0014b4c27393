// src/dag/scheduler.rs

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::dag::graph::StepIndex;
use crate::dag::selection::Selection;
use crate::dag::state::StepState;
use crate::dag::step_id::StepId;
use crate::dag::validate::Dag;

/// Incremental Kahn scheduler over a validated [`Dag`].
///
/// It owns the per-run [`StepState`] of every selected step and is
/// responsible for:
/// - counting, per step, the selected pipeline dependencies that have not
///   succeeded yet
/// - releasing steps whose count reaches zero into the ready set
/// - marking transitive dependents of a failed step as skipped
///
/// Steps that become ready at the same time are handed out in manifest
/// definition order, which makes every schedule reproducible.
///
/// All mutation goes through `&mut self`, so callers that run steps
/// concurrently must funnel completions through one owner (the
/// coordinator loop does this).
#[derive(Debug)]
pub struct Scheduler<'a> {
    dag: &'a Dag,
    /// Definition rank per node index; `None` for non-selected nodes.
    rank: Vec<Option<usize>>,
    /// Node index per rank.
    by_rank: Vec<StepIndex>,
    remaining: Vec<usize>,
    states: Vec<Option<StepState>>,
    /// Ready steps not yet taken, keyed by rank.
    ready: BTreeSet<usize>,
}

impl<'a> Scheduler<'a> {
    pub fn new(dag: &'a Dag, selection: &Selection) -> Self {
        let n = dag.node_count();
        let mut rank = vec![None; n];
        let mut by_rank = Vec::with_capacity(selection.len());

        for i in selection.indices(dag) {
            rank[i] = Some(by_rank.len());
            by_rank.push(i);
        }

        let mut remaining = vec![0; n];
        let mut states = vec![None; n];
        let mut ready = BTreeSet::new();

        for (r, &i) in by_rank.iter().enumerate() {
            // Dependencies outside the selection count as satisfied.
            remaining[i] = dag
                .pipeline_dependencies(i)
                .filter(|&d| rank[d].is_some())
                .count();
            if remaining[i] == 0 {
                states[i] = Some(StepState::Ready);
                ready.insert(r);
            } else {
                states[i] = Some(StepState::Pending);
            }
        }

        debug!(
            selected = by_rank.len(),
            initially_ready = ready.len(),
            "scheduler initialised"
        );

        Self {
            dag,
            rank,
            by_rank,
            remaining,
            states,
            ready,
        }
    }

    /// Per-run state of a node; `None` if it is not part of this run.
    pub fn state_of(&self, index: StepIndex) -> Option<StepState> {
        self.states.get(index).copied().flatten()
    }

    /// Selected steps in definition order.
    pub fn selected(&self) -> &[StepIndex] {
        &self.by_rank
    }

    /// Take the lowest-ranked ready step, if any.
    pub fn pop_ready(&mut self) -> Option<StepIndex> {
        let r = self.ready.pop_first()?;
        Some(self.by_rank[r])
    }

    /// Take every ready step, in definition order.
    pub fn take_ready(&mut self) -> Vec<StepIndex> {
        let taken = std::mem::take(&mut self.ready);
        taken.into_iter().map(|r| self.by_rank[r]).collect()
    }

    /// `Ready -> Running`.
    pub fn mark_running(&mut self, index: StepIndex) -> bool {
        self.advance(index, StepState::Running)
    }

    /// `Running -> Succeeded`; returns dependents that became ready, in
    /// definition order.
    pub fn complete_success(&mut self, index: StepIndex) -> Vec<StepIndex> {
        if !self.advance(index, StepState::Succeeded) {
            return Vec::new();
        }

        let dag = self.dag;
        let mut released = Vec::new();
        for &dependent in &dag.node(index).dependents {
            let Some(r) = self.rank[dependent] else {
                continue;
            };
            if self.states[dependent] != Some(StepState::Pending) {
                continue;
            }
            self.remaining[dependent] = self.remaining[dependent].saturating_sub(1);
            if self.remaining[dependent] == 0 {
                self.states[dependent] = Some(StepState::Ready);
                self.ready.insert(r);
                released.push(r);
            }
        }

        released.sort_unstable();
        released.into_iter().map(|r| self.by_rank[r]).collect()
    }

    /// `Running -> Failed`; every selected transitive dependent that has
    /// not reached a terminal state becomes `Skipped`. Returns those
    /// newly skipped, in definition order.
    pub fn complete_failure(&mut self, index: StepIndex) -> Vec<StepIndex> {
        if !self.advance(index, StepState::Failed) {
            return Vec::new();
        }

        let dag = self.dag;
        let mut skipped = Vec::new();
        let mut stack: Vec<StepIndex> = dag.node(index).dependents.clone();

        while let Some(current) = stack.pop() {
            let Some(r) = self.rank[current] else {
                continue;
            };
            match self.states[current] {
                Some(StepState::Pending) | Some(StepState::Ready) => {
                    self.states[current] = Some(StepState::Skipped);
                    self.ready.remove(&r);
                    skipped.push(r);
                    stack.extend(dag.node(current).dependents.iter().copied());
                }
                _ => {
                    // Already terminal (e.g. skipped by an earlier failure).
                }
            }
        }

        skipped.sort_unstable();
        skipped.into_iter().map(|r| self.by_rank[r]).collect()
    }

    /// Skip a ready step that was cancelled before it started.
    pub fn skip(&mut self, index: StepIndex) -> bool {
        if let Some(r) = self.rank.get(index).copied().flatten() {
            self.ready.remove(&r);
        }
        self.advance(index, StepState::Skipped)
    }

    /// Skip every `Pending` step and every ready step not yet taken.
    ///
    /// Steps that were taken but have not started are left alone; their
    /// owner reports them individually through [`Scheduler::skip`].
    pub fn cancel_remaining(&mut self) -> Vec<StepIndex> {
        let untaken: BTreeSet<usize> = std::mem::take(&mut self.ready);
        let mut skipped = Vec::new();

        for (r, &i) in self.by_rank.iter().enumerate() {
            let state = self.states[i];
            let skip = match state {
                Some(StepState::Pending) => true,
                Some(StepState::Ready) => untaken.contains(&r),
                _ => false,
            };
            if skip {
                self.states[i] = Some(StepState::Skipped);
                skipped.push(i);
            }
        }

        skipped
    }

    /// All selected steps reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.by_rank
            .iter()
            .all(|&i| self.states[i].is_some_and(StepState::is_terminal))
    }

    fn advance(&mut self, index: StepIndex, next: StepState) -> bool {
        match self.state_of(index) {
            Some(current) if current.can_advance_to(next) => {
                self.states[index] = Some(next);
                true
            }
            current => {
                warn!(
                    step = %self.dag.node(index).id,
                    ?current,
                    ?next,
                    "ignoring illegal step state transition"
                );
                false
            }
        }
    }
}

/// Total execution order: every step appears after all of its selected
/// pipeline dependencies; ties go to manifest definition order.
pub fn topological_order(dag: &Dag, selection: &Selection) -> Vec<StepId> {
    let mut scheduler = Scheduler::new(dag, selection);
    let mut order = Vec::with_capacity(selection.len());

    while let Some(i) = scheduler.pop_ready() {
        scheduler.mark_running(i);
        scheduler.complete_success(i);
        order.push(dag.node(i).id.clone());
    }

    order
}

/// Wavefront partition: each wave holds steps whose dependencies all sit
/// in earlier waves, so the steps of one wave can run in parallel.
pub fn wavefronts(dag: &Dag, selection: &Selection) -> Vec<Vec<StepId>> {
    let mut scheduler = Scheduler::new(dag, selection);
    let mut waves = Vec::new();

    loop {
        let wave = scheduler.take_ready();
        if wave.is_empty() {
            break;
        }
        for &i in &wave {
            scheduler.mark_running(i);
        }
        for &i in &wave {
            scheduler.complete_success(i);
        }
        waves.push(wave.into_iter().map(|i| dag.node(i).id.clone()).collect());
    }

    waves
}
