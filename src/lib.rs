// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod manifest;

use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate, resolve_dag_path};
use crate::dag::dot::to_dot;
use crate::dag::{Dag, Graph, Selection, SelectionOptions, validate, wavefronts};
use crate::engine::{Coordinator, RunOptions};
use crate::errors::EtlDagError;
use crate::exec::CommandHandler;
use crate::fs::RealFileSystem;
use crate::manifest::load_manifest;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and manifest loading
/// - graph building and validation
/// - step selection
/// - the coordinator with a shell-command handler
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let (config_path, cfg) = load_config(&args)?;

    let dag_path = match &args.dag {
        Some(path) => PathBuf::from(path),
        None => resolve_dag_path(&config_path, &cfg.config.dag),
    };
    info!(path = %dag_path.display(), "loading manifest");

    let manifest = load_manifest(&RealFileSystem, &dag_path)?;
    let graph = Graph::from_manifest(&manifest)?;
    let dag = validate(graph)?;

    let selection = Selection::resolve(
        &dag,
        &SelectionOptions {
            patterns: args.patterns.clone(),
            exclude: args.exclude.clone(),
            downstream: args.downstream,
            only: args.only,
        },
    )?;
    info!(
        steps = dag.len(),
        selected = selection.len(),
        "manifest validated"
    );

    if selection.is_empty() && !args.patterns.is_empty() {
        return Err(EtlDagError::StepNotFound(args.patterns.join(", ")).into());
    }

    if args.validate {
        print_validation_summary(&dag, &selection);
        return Ok(());
    }

    if args.graphviz {
        print!("{}", to_dot(&dag, &selection));
        return Ok(());
    }

    if args.dry_run {
        print_dry_run(&dag, &selection);
        return Ok(());
    }

    if selection.is_empty() {
        info!("no steps selected; nothing to do");
        return Ok(());
    }

    let options = RunOptions {
        workers: args.workers.unwrap_or(cfg.config.workers),
        fail_fast: args.fail_fast || cfg.config.fail_fast,
    };
    if options.workers == 0 {
        bail!("--workers must be at least 1");
    }

    let handler = CommandHandler::from_config(&cfg)?;
    let coordinator = Coordinator::new(dag, handler, options);

    // Ctrl-C → cancel the run.
    {
        let cancel = coordinator.cancel_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    let report = coordinator.run(&selection).await;
    print!("{report}");

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} step(s) failed");
    }
    if !report.is_success() {
        bail!("run cancelled before every step completed");
    }
    Ok(())
}

/// Use `--config` when given (it must exist). Otherwise use `EtlDag.toml`
/// if present, or built-in defaults.
fn load_config(args: &CliArgs) -> Result<(PathBuf, ConfigFile)> {
    if let Some(path) = &args.config {
        let path = PathBuf::from(path);
        let cfg = load_and_validate(&path)?;
        return Ok((path, cfg));
    }

    let path = default_config_path();
    if path.is_file() {
        let cfg = load_and_validate(&path)?;
        Ok((path, cfg))
    } else {
        debug!(path = %path.display(), "no config file found; using defaults");
        Ok((path, ConfigFile::default()))
    }
}

fn print_validation_summary(dag: &Dag, selection: &Selection) {
    println!("etldag: manifest is valid");
    println!("  steps: {}", dag.len());
    println!("  external snapshots: {}", dag.externals().count());
    println!("  selected: {}", selection.len());
}

/// Print the plan wave by wave; steps in one wave can run in parallel.
fn print_dry_run(dag: &Dag, selection: &Selection) {
    println!("etldag dry-run ({} step(s))", selection.len());
    for (i, wave) in wavefronts(dag, selection).iter().enumerate() {
        println!("  wave {}:", i + 1);
        for step in wave {
            println!("    - {step}");
        }
    }

    debug!("dry-run complete (no execution)");
}
