//! Per-job mapping from artifact key to file on disk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::StepFailureCause;

/// Artifacts produced by one step, merged into the store on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactDelta {
    entries: BTreeMap<String, PathBuf>,
}

impl ArtifactDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.insert(key, path);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.insert(key.into(), path.into());
    }

    pub fn get(&self, key: &str) -> Option<&Path> {
        self.entries.get(key).map(PathBuf::as_path)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for ArtifactDelta {
    type Item = (String, PathBuf);
    type IntoIter = std::collections::btree_map::IntoIter<String, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Read-only view of the inputs a step declared.
#[derive(Debug, Clone, Default)]
pub struct ArtifactView {
    entries: HashMap<String, PathBuf>,
}

impl ArtifactView {
    pub fn get(&self, key: &str) -> Option<&Path> {
        self.entries.get(key).map(PathBuf::as_path)
    }

    pub fn require(&self, key: &str) -> Result<&Path, StepFailureCause> {
        self.get(key)
            .ok_or_else(|| StepFailureCause::MissingInput(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ArtifactStore {
    inner: RwLock<HashMap<String, PathBuf>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one artifact outside of any step (the resolved video).
    pub fn seed(&self, key: impl Into<String>, path: impl Into<PathBuf>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(key.into(), path.into());
    }

    pub fn merge(&self, delta: ArtifactDelta) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.extend(delta);
    }

    pub fn get(&self, key: &str) -> Option<PathBuf> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.contains_key(key)
    }

    pub fn snapshot(&self) -> HashMap<String, PathBuf> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Builds a view over `keys`, or reports the first key not yet produced.
    pub fn view<'a, I>(&self, keys: I) -> Result<ArtifactView, String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut entries = HashMap::new();
        for key in keys {
            match guard.get(key) {
                Some(path) => {
                    entries.insert(key.clone(), path.clone());
                }
                None => return Err(key.clone()),
            }
        }
        Ok(ArtifactView { entries })
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
