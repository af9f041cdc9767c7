//! Registry summary document (`index.json`) and the file hash map.

use super::RegistryError;
use crate::types::get_utc_timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Symbols registered for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Entry keys
    pub symbols: BTreeSet<String>,
    pub last_updated: u64,
}

/// Summary of everything in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryIndex {
    pub version: u32,
    pub created_at: u64,
    pub last_updated: u64,
    pub symbols_count: usize,
    /// Keyed by normalized project-relative path
    pub files_tracked: BTreeMap<String, FileRecord>,
}

impl Default for RegistryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryIndex {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        let now = get_utc_timestamp();
        Self {
            version: Self::CURRENT_VERSION,
            created_at: now,
            last_updated: now,
            symbols_count: 0,
            files_tracked: BTreeMap::new(),
        }
    }

    /// Record `key` under `path`.
    pub fn track(&mut self, path: &str, key: &str) {
        let now = get_utc_timestamp();
        let record = self.files_tracked.entry(path.to_string()).or_default();
        if record.symbols.insert(key.to_string()) {
            self.symbols_count += 1;
        }
        record.last_updated = now;
        self.last_updated = now;
    }

    /// Forget every key in `keys` in one pass over the tracked files. Files
    /// left empty are dropped and returned.
    pub fn untrack<S>(&mut self, keys: &BTreeSet<S>) -> Vec<String>
    where
        S: std::borrow::Borrow<str> + Ord,
    {
        let mut emptied = Vec::new();
        let mut removed = 0;
        self.files_tracked.retain(|path, record| {
            let before = record.symbols.len();
            record.symbols.retain(|key| !keys.contains(key.as_str()));
            removed += before - record.symbols.len();
            if record.symbols.is_empty() {
                emptied.push(path.clone());
                false
            } else {
                true
            }
        });
        self.symbols_count = self.symbols_count.saturating_sub(removed);
        self.last_updated = get_utc_timestamp();
        emptied
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let index: Self = read_json(path)?;
        if index.version > Self::CURRENT_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: index.version,
                supported: Self::CURRENT_VERSION,
            });
        }
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        write_json_atomic(path, self)
    }
}

/// Stored content hash per normalized path.
pub type FileHashes = BTreeMap<String, String>;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|e| RegistryError::Corrupted {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write through a temp file in the same directory, then rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RegistryError> {
    let io_error = |source: std::io::Error| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(io_error)?;

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| RegistryError::Serialization(e.to_string()))?;
    let mut file = NamedTempFile::new_in(parent).map_err(io_error)?;
    file.write_all(&json).map_err(io_error)?;
    file.flush().map_err(io_error)?;
    file.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
