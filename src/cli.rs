// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `etldag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "etldag",
    version,
    about = "Validate, plan and run a DAG of ETL steps described in YAML manifests.",
    long_about = None
)]
pub struct CliArgs {
    /// Regexes over step ids selecting what to run. None selects every step.
    #[arg(value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `EtlDag.toml` in the current working directory. A missing
    /// default config falls back to built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Manifest to load, overriding `[config].dag`.
    #[arg(long, value_name = "PATH")]
    pub dag: Option<String>,

    /// Maximum number of steps running at once, overriding `[config].workers`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Stop starting new steps after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// Also select every step that depends on a matched step.
    #[arg(long)]
    pub downstream: bool,

    /// Run only the matched steps, without their upstream dependencies.
    #[arg(long)]
    pub only: bool,

    /// Remove steps matching this regex after expansion. Repeatable.
    #[arg(long, value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Print the execution plan (one line per wave) without running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Load and validate the manifest, print a summary and exit.
    #[arg(long)]
    pub validate: bool,

    /// Print the selected graph in Graphviz DOT format and exit.
    #[arg(long)]
    pub graphviz: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ETLDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
