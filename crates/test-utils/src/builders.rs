#![allow(dead_code)]

use etldag::config::{ConfigFile, RawConfigFile};
use etldag::dag::{Dag, Graph, validate};
use etldag::manifest::{Manifest, ManifestEntry};

/// Builder for an in-memory `Manifest`, in definition order.
pub struct ManifestBuilder {
    entries: Vec<ManifestEntry>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    pub fn step(mut self, id: &str, dependencies: &[&str]) -> Self {
        self.entries
            .push(ManifestEntry::new(id, dependencies.iter().copied()));
        self
    }

    pub fn build(self) -> Manifest {
        Manifest::from_entries(self.entries)
    }

    pub fn graph(self) -> Graph {
        Graph::from_manifest(&self.build()).expect("Failed to build graph from builder")
    }

    /// Build and validate; panics if the manifest is not a valid DAG.
    pub fn dag(self) -> Dag {
        validate(self.graph()).expect("Manifest from builder is not a valid DAG")
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn dag(mut self, path: &str) -> Self {
        self.config.config.dag = path.to_string();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.config.workers = workers;
        self
    }

    pub fn fail_fast(mut self, val: bool) -> Self {
        self.config.config.fail_fast = val;
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.config.handler.cmd = Some(cmd.to_string());
        self
    }

    pub fn artifact(mut self, template: &str) -> Self {
        self.config.handler.artifact = template.to_string();
        self
    }

    pub fn channel(mut self, channel: &str, cmd: &str) -> Self {
        self.config
            .handler
            .channels
            .insert(channel.to_string(), cmd.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
