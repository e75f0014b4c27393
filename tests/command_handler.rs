// tests/command_handler.rs
#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use etldag::dag::{Selection, StepState};
use etldag::engine::{Coordinator, RunOptions};
use etldag::exec::{CommandHandler, ExecutionError};
use etldag_test_utils::builders::{ConfigFileBuilder, ManifestBuilder};
use etldag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const MEADOW: &str = "meadow://wb/2024-03-27/world_bank_pip";
const GARDEN: &str = "garden://wb/2024-03-27/world_bank_pip";
const GRAPHER: &str = "grapher://wb/2024-03-27/world_bank_pip";

fn pipeline() -> etldag::dag::Dag {
    ManifestBuilder::new()
        .step(MEADOW, &["snapshot://wb/2024-03-27/world_bank_pip.csv"])
        .step(GARDEN, &[MEADOW])
        .step(GRAPHER, &[GARDEN])
        .dag()
}

#[tokio::test]
async fn successful_commands_yield_rendered_artifacts() -> TestResult {
    init_tracing();
    let dag = pipeline();
    let selection = Selection::all(&dag);
    let handler = CommandHandler::new("true", "data/{channel}/{namespace}/{version}/{short_name}");

    let report = with_timeout(
        Coordinator::new(dag, handler, RunOptions::default()).run(&selection),
    )
    .await;

    assert!(report.is_success());
    assert_eq!(
        report.get(GARDEN).unwrap().artifact.as_ref().unwrap().as_str(),
        "data/garden/wb/2024-03-27/world_bank_pip"
    );
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_fails_the_step_with_its_code() -> TestResult {
    init_tracing();
    let dag = pipeline();
    let selection = Selection::all(&dag);
    let cfg = ConfigFileBuilder::new()
        .cmd("true")
        .channel("garden", "exit 3")
        .build();
    let handler = CommandHandler::from_config(&cfg)?;

    let report = with_timeout(
        Coordinator::new(dag, handler, RunOptions::default()).run(&selection),
    )
    .await;

    assert_eq!(report.state_of(MEADOW), Some(StepState::Succeeded));
    assert_eq!(
        report.get(GARDEN).unwrap().error,
        Some(ExecutionError::CommandFailed { code: 3 })
    );
    assert_eq!(report.state_of(GRAPHER), Some(StepState::Skipped));
    Ok(())
}

#[tokio::test]
async fn commands_see_step_and_dependency_environment() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let out = dir.path().display().to_string();

    let dag = pipeline();
    let selection = Selection::all(&dag);
    let cmd = format!(
        "printf '%s|%s|%s' \"$ETLDAG_STEP\" \"$ETLDAG_ARTIFACT\" \"$ETLDAG_DEPENDENCIES\" > '{out}/{{channel}}.txt'"
    );
    let handler = CommandHandler::new(cmd, "out/{channel}/{short_name}");

    let report = with_timeout(
        Coordinator::new(dag, handler, RunOptions::default()).run(&selection),
    )
    .await;
    assert!(report.is_success());

    let garden = fs::read_to_string(dir.path().join("garden.txt"))?;
    assert_eq!(
        garden,
        format!("{GARDEN}|out/garden/world_bank_pip|out/meadow/world_bank_pip")
    );
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_the_running_command() -> TestResult {
    init_tracing();
    let dag = pipeline();
    let selection = Selection::all(&dag);
    let handler = CommandHandler::new("sleep 30", "unused");
    let coordinator = Coordinator::new(dag, handler, RunOptions::default());
    let cancel = coordinator.cancel_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let report = with_timeout(coordinator.run(&selection)).await;

    assert_eq!(
        report.get(MEADOW).unwrap().error,
        Some(ExecutionError::Cancelled)
    );
    assert_eq!(report.state_of(GARDEN), Some(StepState::Skipped));
    assert_eq!(report.state_of(GRAPHER), Some(StepState::Skipped));
    Ok(())
}
