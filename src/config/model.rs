// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// dag = "dag/main.yml"
/// workers = 4
/// fail_fast = false
///
/// [handler]
/// cmd = "python -m etl.run {id}"
/// artifact = "data/{channel}/{namespace}/{version}/{short_name}"
///
/// [handler.channels]
/// grapher = "python -m etl.grapher {id}"
/// ```
///
/// All sections are optional and have reasonable defaults. Use
/// [`ConfigFile::try_from`] to get a validated [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Run behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// How steps are executed, from `[handler]`.
    #[serde(default)]
    pub handler: HandlerSection,
}

/// Validated configuration. Only constructed through
/// `ConfigFile::try_from(RawConfigFile)` (see `config::validate`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub handler: HandlerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, handler: HandlerSection) -> Self {
        Self { config, handler }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(ConfigSection::default(), HandlerSection::default())
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Manifest path, relative to the config file.
    #[serde(default = "default_dag")]
    pub dag: String,

    /// Maximum number of steps executing at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// On the first failure, stop starting new steps and skip everything
    /// that has not started yet.
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_dag() -> String {
    "dag/main.yml".to_string()
}

fn default_workers() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            dag: default_dag(),
            workers: default_workers(),
            fail_fast: false,
        }
    }
}

/// `[handler]` section.
///
/// Every template may use the placeholders `{id}`, `{channel}`,
/// `{namespace}`, `{version}` and `{short_name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerSection {
    /// Shell command run for each step. Required to execute anything;
    /// `--dry-run` and `--validate` work without it.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Artifact reference reported for a successful step.
    #[serde(default = "default_artifact")]
    pub artifact: String,

    /// Per-channel overrides of `cmd`, keyed by channel name.
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
}

fn default_artifact() -> String {
    "data/{channel}/{namespace}/{version}/{short_name}".to_string()
}

impl Default for HandlerSection {
    fn default() -> Self {
        Self {
            cmd: None,
            artifact: default_artifact(),
            channels: BTreeMap::new(),
        }
    }
}
