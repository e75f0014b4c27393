// src/manifest/model.rs

use std::path::PathBuf;

/// One `step id -> dependencies` entry, exactly as written in a manifest.
///
/// Ids are kept as raw strings here; they are parsed into
/// [`crate::dag::StepId`]s when the graph is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub dependencies: Vec<String>,
    /// File the entry was read from, if any (used in diagnostics).
    pub source: Option<PathBuf>,
}

impl ManifestEntry {
    pub fn new<I, S>(id: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            source: None,
        }
    }
}

/// Ordered collection of manifest entries.
///
/// Entry order is the manifest insertion order, which the scheduler uses
/// as its tie-break. Section comments and grouping in the source file are
/// not preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    /// Append all entries of `other`, keeping their order.
    pub fn extend(&mut self, other: Manifest) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ManifestEntry> for Manifest {
    fn from_iter<T: IntoIterator<Item = ManifestEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Manifest {
    type Item = ManifestEntry;
    type IntoIter = std::vec::IntoIter<ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
