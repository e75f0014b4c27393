// src/manifest/loader.rs

//! YAML manifest loading.
//!
//! A manifest file looks like:
//!
//! ```yaml
//! include:
//!   - dag/inequality.yml
//! steps:
//!   meadow://wid/2023-08-24/world_inequality_database:
//!     - snapshot://wid/2023-08-24/world_inequality_database.csv
//!   garden://wid/2023-08-24/world_inequality_database:
//!     - meadow://wid/2023-08-24/world_inequality_database
//! ```
//!
//! A file's own `steps` come first, then each `include` in listed order,
//! depth-first. Include paths are relative to the including file.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, info};

use crate::errors::{EtlDagError, Result};
use crate::fs::FileSystem;
use crate::manifest::model::{Manifest, ManifestEntry};

/// On-disk shape of a single manifest file.
#[derive(Debug, Deserialize)]
struct RawManifestFile {
    #[serde(default)]
    include: Option<Vec<String>>,
    #[serde(default)]
    steps: Option<StepEntries>,
}

/// `steps:` entries in file order. Repeated keys are kept so that the graph
/// builder can tell identical redefinitions from conflicting ones.
#[derive(Debug, Default)]
struct StepEntries(Vec<(Value, Value)>);

impl<'de> Deserialize<'de> for StepEntries {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = StepEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping from step ids to dependency lists")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<StepEntries, E> {
                Ok(StepEntries::default())
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<StepEntries, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<serde_yaml::Value, serde_yaml::Value>()? {
                    entries.push(entry);
                }
                Ok(StepEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// A parsed manifest file before its includes are followed.
#[derive(Debug, Clone, Default)]
pub struct ManifestFile {
    pub manifest: Manifest,
    pub includes: Vec<String>,
}

/// Parse the text of one manifest file. `source` is only used for
/// diagnostics and entry provenance.
pub fn parse_manifest_str(text: &str, source: Option<&Path>) -> Result<ManifestFile> {
    let source_path = source
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("<inline>"));

    let manifest_error = |message: String| EtlDagError::ManifestError {
        path: source_path.clone(),
        message,
    };

    // A file with no document (or only comments) is a valid, empty manifest.
    if is_blank_document(text) {
        return Ok(ManifestFile::default());
    }
    // Deserialized straight from text: going through `Value` would reject
    // repeated step keys.
    let raw: Option<RawManifestFile> =
        serde_yaml::from_str(text).map_err(|e| manifest_error(e.to_string()))?;
    let Some(raw) = raw else {
        return Ok(ManifestFile::default());
    };

    let mut manifest = Manifest::new();

    for (key, value) in raw.steps.unwrap_or_default().0 {
        let id = match key {
            Value::String(s) => s,
            other => {
                return Err(manifest_error(format!(
                    "step keys must be strings, found {other:?}"
                )));
            }
        };

        let dependencies = match value {
            Value::Null => Vec::new(),
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(manifest_error(format!(
                        "dependencies of '{id}' must be strings, found {other:?}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(manifest_error(format!(
                    "dependencies of '{id}' must be a list, found {other:?}"
                )));
            }
        };

        let mut entry = ManifestEntry::new(id, dependencies);
        entry.source = source.map(Path::to_path_buf);
        manifest.push(entry);
    }

    Ok(ManifestFile {
        manifest,
        includes: raw.include.unwrap_or_default(),
    })
}

fn is_blank_document(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "---")
}

/// Load a manifest file and everything it includes.
///
/// A file included more than once (e.g. from two sibling includes) is read
/// once; an include that leads back to a file still being loaded is an
/// [`EtlDagError::IncludeCycle`].
pub fn load_manifest(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<Manifest> {
    let mut loader = Loader {
        fs,
        visiting: Vec::new(),
        loaded: HashSet::new(),
        manifest: Manifest::new(),
    };
    loader.load(path.as_ref())?;

    info!(
        files = loader.loaded.len(),
        entries = loader.manifest.len(),
        "manifest loaded"
    );

    Ok(loader.manifest)
}

struct Loader<'a> {
    fs: &'a dyn FileSystem,
    /// Files on the current include chain, outermost first.
    visiting: Vec<PathBuf>,
    loaded: HashSet<PathBuf>,
    manifest: Manifest,
}

impl Loader<'_> {
    fn load(&mut self, path: &Path) -> Result<()> {
        if !self.fs.is_file(path) {
            return Err(EtlDagError::ManifestError {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }
        let canonical = self.fs.canonicalize(path)?;

        if let Some(pos) = self.visiting.iter().position(|p| p == &canonical) {
            let chain = self.visiting[pos..]
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(EtlDagError::IncludeCycle(chain));
        }

        if !self.loaded.insert(canonical.clone()) {
            debug!(path = %canonical.display(), "manifest already loaded; skipping repeated include");
            return Ok(());
        }

        let text = self.fs.read_to_string(&canonical)?;
        let file = parse_manifest_str(&text, Some(&canonical))?;
        debug!(
            path = %canonical.display(),
            steps = file.manifest.len(),
            includes = file.includes.len(),
            "parsed manifest file"
        );

        self.manifest.extend(file.manifest);

        let base = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        self.visiting.push(canonical);
        for include in &file.includes {
            self.load(&base.join(include))?;
        }
        self.visiting.pop();

        Ok(())
    }
}
