// src/engine/coordinator.rs

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dag::{Dag, NodeKind, Scheduler, Selection, StepIndex, StepState};
use crate::exec::{Artifact, CancelSignal, ExecutionError, StepContext, StepHandler};

use super::report::{RunReport, SkipReason, StepReport};
use super::{RunOptions, StepFinished};

const EVENT_BUFFER: usize = 64;

/// Requests cancellation of a running [`Coordinator`].
///
/// Steps that have not started are skipped; running handlers see the
/// request through their [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Per-step bookkeeping collected while the run progresses.
#[derive(Debug, Default, Clone)]
struct Ledger {
    artifact: Option<Artifact>,
    error: Option<ExecutionError>,
    skipped_dependents: Vec<StepIndex>,
    skip_reason: Option<SkipReason>,
    started_at: Option<Instant>,
    duration: Option<Duration>,
}

/// Executes the selected steps of a validated DAG.
///
/// While fewer than `workers` handlers are running, the lowest-ranked
/// ready step is started as its own tokio task. Tasks report back over an
/// mpsc channel and the coordinator loop is the only place that mutates
/// the [`Scheduler`]. With one worker, steps run exactly in
/// [`crate::dag::topological_order`].
///
/// A failed step never aborts the run: its transitive dependents are
/// skipped and unrelated branches keep going. With `fail_fast`, the first
/// failure stops new steps from starting; running handlers finish on
/// their own. A [`CancelHandle`] does the same and also signals running
/// handlers through their [`CancelSignal`].
pub struct Coordinator<H: StepHandler> {
    dag: Dag,
    handler: Arc<H>,
    options: RunOptions,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl<H: StepHandler> fmt::Debug for Coordinator<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("steps", &self.dag.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<H: StepHandler + 'static> Coordinator<H> {
    pub fn new(dag: Dag, handler: H, options: RunOptions) -> Self {
        Self::with_shared_handler(dag, Arc::new(handler), options)
    }

    /// Like [`Coordinator::new`], for callers that keep their own handle on
    /// the handler (tests inspect what it recorded).
    pub fn with_shared_handler(dag: Dag, handler: Arc<H>, options: RunOptions) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            dag,
            handler,
            options,
            cancel_tx: Arc::new(tx),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Run every step in `selection` and return the terminal state of each.
    pub async fn run(self, selection: &Selection) -> RunReport {
        let workers = self.options.workers.max(1);
        let (event_tx, mut event_rx) = mpsc::channel::<StepFinished>(EVENT_BUFFER);
        let mut cancel_rx = self.cancel_tx.subscribe();

        let mut scheduler = Scheduler::new(&self.dag, selection);
        let mut ledger = vec![Ledger::default(); self.dag.node_count()];
        let mut running = 0usize;
        let mut cancelled = false;
        let mut watch_cancel = true;

        info!(
            steps = selection.len(),
            workers,
            fail_fast = self.options.fail_fast,
            "starting run"
        );

        loop {
            if !cancelled && *cancel_rx.borrow_and_update() {
                info!("cancellation requested; skipping steps that have not started");
                cancelled = true;
            }

            if cancelled {
                for index in scheduler.cancel_remaining() {
                    ledger[index].skip_reason = Some(SkipReason::Cancelled);
                }
            } else {
                while running < workers {
                    let Some(index) = scheduler.pop_ready() else {
                        break;
                    };
                    self.dispatch(index, &mut scheduler, &mut ledger, &event_tx);
                    running += 1;
                }
            }

            if running == 0 {
                break;
            }

            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        warn!("step event channel closed unexpectedly");
                        break;
                    };
                    running -= 1;
                    let failed = self.handle_finished(event, &mut scheduler, &mut ledger);
                    if failed && self.options.fail_fast && !cancelled {
                        info!("fail-fast enabled; skipping steps that have not started");
                        cancelled = true;
                    }
                }
                changed = cancel_rx.changed(), if watch_cancel && !cancelled => {
                    if changed.is_err() {
                        watch_cancel = false;
                    }
                }
            }
        }

        if !scheduler.is_finished() {
            warn!("run ended with unfinished steps; marking them skipped");
            let unfinished: Vec<StepIndex> = scheduler
                .selected()
                .iter()
                .copied()
                .filter(|&i| !scheduler.state_of(i).is_some_and(StepState::is_terminal))
                .collect();
            for index in unfinished {
                scheduler.skip(index);
                ledger[index].skip_reason = Some(SkipReason::Cancelled);
            }
        }

        let report = self.build_report(&scheduler, ledger);
        info!(
            succeeded = report.count(StepState::Succeeded),
            failed = report.count(StepState::Failed),
            skipped = report.count(StepState::Skipped),
            "run finished"
        );
        report
    }

    fn dispatch(
        &self,
        index: StepIndex,
        scheduler: &mut Scheduler<'_>,
        ledger: &mut [Ledger],
        event_tx: &mpsc::Sender<StepFinished>,
    ) {
        let node = self.dag.node(index);
        let mut dependencies = Vec::new();
        let mut snapshots = Vec::new();
        for &dep in &node.dependencies {
            let dep_node = self.dag.node(dep);
            if dep_node.kind == NodeKind::External {
                snapshots.push(dep_node.id.clone());
            } else if let Some(artifact) = &ledger[dep].artifact {
                // Unselected dependencies have no artifact from this run.
                dependencies.push((dep_node.id.clone(), artifact.clone()));
            }
        }

        let ctx = StepContext {
            step: node.id.clone(),
            dependencies,
            snapshots,
            cancel: CancelSignal::new(self.cancel_tx.subscribe()),
        };

        scheduler.mark_running(index);
        ledger[index].started_at = Some(Instant::now());
        info!(step = %node.id, "step started");

        let handler = Arc::clone(&self.handler);
        let tx = event_tx.clone();

        tokio::spawn(async move {
            // Run the handler on its own task so a panic becomes a step
            // failure instead of losing the completion event.
            let outcome = match tokio::spawn(async move { handler.execute(ctx).await }).await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(ExecutionError::Panicked(join_err.to_string())),
            };
            let _ = tx.send(StepFinished { index, outcome }).await;
        });
    }

    /// Apply a completion; returns true if the step failed.
    fn handle_finished(
        &self,
        event: StepFinished,
        scheduler: &mut Scheduler<'_>,
        ledger: &mut [Ledger],
    ) -> bool {
        let StepFinished { index, outcome } = event;
        let step = &self.dag.node(index).id;
        ledger[index].duration = ledger[index].started_at.map(|t| t.elapsed());

        match outcome {
            Ok(artifact) => {
                info!(step = %step, artifact = %artifact, "step succeeded");
                ledger[index].artifact = Some(artifact);
                let released = scheduler.complete_success(index);
                debug!(step = %step, released = released.len(), "released dependents");
                false
            }
            Err(err) => {
                let skipped = scheduler.complete_failure(index);
                warn!(
                    step = %step,
                    error = %err,
                    skipped = skipped.len(),
                    "step failed; skipping its dependents"
                );
                for &dependent in &skipped {
                    ledger[dependent].skip_reason = Some(SkipReason::UpstreamFailed(step.clone()));
                }
                ledger[index].error = Some(err);
                ledger[index].skipped_dependents = skipped;
                true
            }
        }
    }

    fn build_report(&self, scheduler: &Scheduler<'_>, mut ledger: Vec<Ledger>) -> RunReport {
        let steps = scheduler
            .selected()
            .iter()
            .map(|&index| {
                let entry = std::mem::take(&mut ledger[index]);
                let state = scheduler.state_of(index).unwrap_or(StepState::Skipped);
                let mut report = StepReport::new(self.dag.node(index).id.clone(), state);
                report.artifact = entry.artifact;
                report.error = entry.error;
                report.skipped_dependents = entry
                    .skipped_dependents
                    .iter()
                    .map(|&i| self.dag.node(i).id.clone())
                    .collect();
                report.skip_reason = entry.skip_reason;
                report.duration = entry.duration;
                report
            })
            .collect();

        RunReport::new(steps)
    }
}
