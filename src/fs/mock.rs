// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory filesystem keyed by lexically normalised paths.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = normalize(path.as_ref());
        let mut files = self.files.lock().unwrap();
        files.insert(path, content.into());
    }
}

/// Fold `.` and `..` components without touching a real disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        match files.get(&normalize(path)) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(&normalize(path))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let normalized = normalize(path);
        if self.is_file(&normalized) {
            Ok(normalized)
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_components_resolve_to_the_same_file() {
        let fs = MockFileSystem::new();
        fs.add_file("dag/main.yml", "steps: {}");

        let a = fs.canonicalize(Path::new("dag/sub/../main.yml")).unwrap();
        let b = fs.canonicalize(Path::new("./dag/main.yml")).unwrap();
        assert_eq!(a, b);
        assert_eq!(fs.read_to_string(&a).unwrap(), "steps: {}");
    }

    #[test]
    fn missing_file_is_an_error() {
        let fs = MockFileSystem::new();
        assert!(!fs.is_file(Path::new("nope.yml")));
        assert!(fs.read_to_string(Path::new("nope.yml")).is_err());
        assert!(fs.canonicalize(Path::new("nope.yml")).is_err());
    }
}
