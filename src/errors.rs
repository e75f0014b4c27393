// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::dag::validate::ValidationReport;

#[derive(Error, Debug)]
pub enum EtlDagError {
    #[error("Malformed step identifier '{id}': {reason}")]
    MalformedIdentifier { id: String, reason: String },

    /// Every problem found by a single validation pass.
    #[error("Manifest validation failed with {} problem(s):\n{}", .0.len(), .0)]
    Validation(ValidationReport),

    #[error("Manifest error in {}: {message}", .path.display())]
    ManifestError { path: PathBuf, message: String },

    #[error("Manifest include cycle: {0}")]
    IncludeCycle(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No step matches: {0}")]
    StepNotFound(String),

    #[error("Invalid step selection pattern: {0}")]
    SelectionError(#[from] regex::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EtlDagError>;
