// src/manifest/mod.rs

//! Manifest files: ordered `step id -> [dependency ids]` entries.
//!
//! - [`model`] holds the in-memory [`Manifest`] and its entries.
//! - [`loader`] reads YAML manifest files (with `include:` composition)
//!   through a [`crate::fs::FileSystem`].

pub mod loader;
pub mod model;

pub use loader::{load_manifest, parse_manifest_str};
pub use model::{Manifest, ManifestEntry};
