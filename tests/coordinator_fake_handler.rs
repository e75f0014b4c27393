// tests/coordinator_fake_handler.rs

use std::sync::Arc;
use std::time::Duration;

use etldag::dag::{Dag, Selection, SelectionOptions, StepState, topological_order};
use etldag::engine::{Coordinator, RunOptions, RunReport, SkipReason};
use etldag::exec::ExecutionError;
use etldag_test_utils::builders::ManifestBuilder;
use etldag_test_utils::fake_handler::FakeHandler;
use etldag_test_utils::{init_tracing, with_timeout};

const BASE: &str = "meadow://d/2024-01-01/base";
const LEFT: &str = "garden://d/2024-01-01/left";
const RIGHT: &str = "garden://d/2024-01-01/right";
const TOP: &str = "grapher://d/2024-01-01/top";
const LONE: &str = "meadow://e/2024-01-01/lone";

/// base -> {left, right} -> top, plus an unrelated `lone` step.
fn diamond() -> Dag {
    ManifestBuilder::new()
        .step(TOP, &[LEFT, RIGHT])
        .step(LEFT, &[BASE])
        .step(RIGHT, &[BASE])
        .step(BASE, &["snapshot://d/2024-01-01/base.csv"])
        .step(LONE, &[])
        .dag()
}

async fn run_with(dag: Dag, handler: &Arc<FakeHandler>, options: RunOptions) -> RunReport {
    init_tracing();
    let selection = Selection::all(&dag);
    let coordinator = Coordinator::with_shared_handler(dag, Arc::clone(handler), options);
    with_timeout(coordinator.run(&selection)).await
}

#[tokio::test]
async fn single_worker_follows_topological_order() {
    let dag = diamond();
    let expected: Vec<String> = topological_order(&dag, &Selection::all(&dag))
        .iter()
        .map(ToString::to_string)
        .collect();

    let handler = Arc::new(FakeHandler::new());
    let report = run_with(dag, &handler, RunOptions::default()).await;

    assert!(report.is_success());
    assert_eq!(handler.executed(), expected);
    assert_eq!(handler.max_concurrency(), 1);

    // Report is in manifest order, not execution order.
    let order: Vec<String> = report.steps().iter().map(|r| r.step.to_string()).collect();
    assert_eq!(order, vec![TOP, LEFT, RIGHT, BASE, LONE]);
    assert_eq!(
        report.get(TOP).unwrap().artifact.as_ref().unwrap().as_str(),
        FakeHandler::artifact_for(TOP)
    );
}

#[tokio::test]
async fn dependency_artifacts_are_handed_to_dependents() {
    let handler = Arc::new(FakeHandler::new());
    run_with(diamond(), &handler, RunOptions::default()).await;

    assert_eq!(
        handler.received_dependencies(TOP).unwrap(),
        vec![FakeHandler::artifact_for(LEFT), FakeHandler::artifact_for(RIGHT)]
    );
    // Snapshots are not pipeline artifacts.
    assert!(handler.received_dependencies(BASE).unwrap().is_empty());
}

#[tokio::test]
async fn failure_skips_dependents_and_spares_unrelated_steps() {
    let handler = Arc::new(FakeHandler::new().fail_on(BASE));
    let report = run_with(diamond(), &handler, RunOptions::default()).await;

    assert_eq!(report.state_of(BASE), Some(StepState::Failed));
    assert_eq!(report.state_of(LONE), Some(StepState::Succeeded));
    for step in [LEFT, RIGHT, TOP] {
        assert_eq!(report.state_of(step), Some(StepState::Skipped), "{step}");
        assert!(!handler.was_executed(step), "{step} must not run");
        assert_eq!(
            report.get(step).unwrap().skip_reason,
            Some(SkipReason::UpstreamFailed(BASE.parse().unwrap()))
        );
    }

    let base = report.get(BASE).unwrap();
    assert!(matches!(base.error, Some(ExecutionError::Failed(_))));
    let skipped: Vec<String> = base.skipped_dependents.iter().map(ToString::to_string).collect();
    assert_eq!(skipped, vec![TOP, LEFT, RIGHT]);

    assert!(!report.is_success());
    assert_eq!(report.failures().count(), 1);
    let summary = report.to_string();
    assert!(summary.contains("1 succeeded, 1 failed, 3 skipped"));
}

#[tokio::test]
async fn dependent_of_two_failures_is_attributed_to_the_first() {
    let handler = Arc::new(FakeHandler::new().fail_on(LEFT).fail_on(RIGHT));
    let report = run_with(diamond(), &handler, RunOptions::default()).await;

    assert_eq!(report.state_of(LEFT), Some(StepState::Failed));
    assert_eq!(report.state_of(RIGHT), Some(StepState::Failed));
    assert_eq!(report.state_of(TOP), Some(StepState::Skipped));
    assert_eq!(
        report.get(TOP).unwrap().skip_reason,
        Some(SkipReason::UpstreamFailed(LEFT.parse().unwrap()))
    );
    assert_eq!(report.get(LEFT).unwrap().skipped_dependents.len(), 1);
    assert!(report.get(RIGHT).unwrap().skipped_dependents.is_empty());
}

#[tokio::test]
async fn worker_limit_bounds_concurrency() {
    let mut builder = ManifestBuilder::new();
    for i in 0..6 {
        builder = builder.step(&format!("meadow://par/2024-01-01/step_{i}"), &[]);
    }
    let dag = builder.dag();

    let handler = Arc::new(FakeHandler::new().with_delay(Duration::from_millis(30)));
    let report = run_with(
        dag,
        &handler,
        RunOptions {
            workers: 2,
            fail_fast: false,
        },
    )
    .await;

    assert!(report.is_success());
    assert_eq!(handler.executed().len(), 6);
    assert_eq!(handler.max_concurrency(), 2);
}

#[tokio::test]
async fn fail_fast_skips_everything_not_yet_started() {
    let dag = ManifestBuilder::new()
        .step("meadow://a/2024-01-01/first", &[])
        .step("meadow://b/2024-01-01/second", &[])
        .step("meadow://c/2024-01-01/third", &[])
        .dag();

    let handler = Arc::new(FakeHandler::new().fail_on("meadow://a/2024-01-01/first"));
    let report = run_with(
        dag,
        &handler,
        RunOptions {
            workers: 1,
            fail_fast: true,
        },
    )
    .await;

    assert_eq!(handler.executed(), vec!["meadow://a/2024-01-01/first"]);
    assert_eq!(report.count(StepState::Failed), 1);
    for step in ["meadow://b/2024-01-01/second", "meadow://c/2024-01-01/third"] {
        let r = report.get(step).unwrap();
        assert_eq!(r.state, StepState::Skipped);
        assert_eq!(r.skip_reason, Some(SkipReason::Cancelled));
    }
}

#[tokio::test]
async fn without_fail_fast_independent_steps_still_run() {
    let dag = ManifestBuilder::new()
        .step("meadow://a/2024-01-01/first", &[])
        .step("meadow://b/2024-01-01/second", &[])
        .dag();

    let handler = Arc::new(FakeHandler::new().fail_on("meadow://a/2024-01-01/first"));
    let report = run_with(dag, &handler, RunOptions::default()).await;

    assert_eq!(report.state_of("meadow://b/2024-01-01/second"), Some(StepState::Succeeded));
}

#[tokio::test]
async fn panicking_handler_fails_only_its_step() {
    let handler = Arc::new(FakeHandler::new().panic_on(RIGHT));
    let report = run_with(diamond(), &handler, RunOptions::default()).await;

    assert_eq!(report.state_of(RIGHT), Some(StepState::Failed));
    assert!(matches!(
        report.get(RIGHT).unwrap().error,
        Some(ExecutionError::Panicked(_))
    ));
    assert_eq!(report.state_of(LEFT), Some(StepState::Succeeded));
    assert_eq!(report.state_of(TOP), Some(StepState::Skipped));
}

#[tokio::test]
async fn cancel_before_run_starts_nothing() {
    init_tracing();
    let dag = diamond();
    let selection = Selection::all(&dag);
    let handler = Arc::new(FakeHandler::new());
    let coordinator =
        Coordinator::with_shared_handler(dag, Arc::clone(&handler), RunOptions::default());

    let cancel = coordinator.cancel_handle();
    cancel.cancel();
    assert!(cancel.is_cancelled());

    let report = with_timeout(coordinator.run(&selection)).await;
    assert!(handler.executed().is_empty());
    assert_eq!(report.count(StepState::Skipped), 5);
    assert!(
        report
            .steps()
            .iter()
            .all(|r| r.skip_reason == Some(SkipReason::Cancelled))
    );
}

#[tokio::test]
async fn only_selected_steps_are_executed_and_reported() {
    init_tracing();
    let dag = diamond();
    let selection = Selection::resolve(
        &dag,
        &SelectionOptions {
            patterns: vec![LEFT.to_string()],
            ..Default::default()
        },
    )
    .unwrap();

    let handler = Arc::new(FakeHandler::new());
    let coordinator =
        Coordinator::with_shared_handler(dag, Arc::clone(&handler), RunOptions::default());
    let report = with_timeout(coordinator.run(&selection)).await;

    assert_eq!(handler.executed(), vec![BASE, LEFT]);
    assert_eq!(report.steps().len(), 2);
    assert!(report.get(TOP).is_none());
}
