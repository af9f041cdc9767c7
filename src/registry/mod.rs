//! Persistent symbol registry.
//!
//! Stores each processed symbol with its embedding and provenance so later
//! runs can tell which symbols changed. Layout under the registry directory:
//!
//! ```text
//! index.json                  summary and per-file symbol lists
//! metadata/file_hashes.json   content hash per tracked file
//! symbols/<entry_key>.json    one entry per symbol
//! ```

mod entry;
mod file_hash;
mod index_doc;
mod store;

pub use entry::{EMBEDDING_METHOD_KEY, ENTRY_SCHEMA_VERSION, RegistryEntry, SIMILARITY_METHOD_KEY};
pub use file_hash::{hash_file, normalize_path};
pub use index_doc::{FileHashes, FileRecord, RegistryIndex};
pub use store::{RegistryStats, RegistryStore};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How a file compares with its recorded hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Unchanged,
    Deleted,
}

/// Overall registry condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    Healthy,
    Stale,
    Corrupted,
    Missing,
}

impl fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistryStatus::Healthy => "healthy",
            RegistryStatus::Stale => "stale",
            RegistryStatus::Corrupted => "corrupted",
            RegistryStatus::Missing => "missing",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(
        "Registry I/O error at '{}': {source}\nSuggestion: Check disk space and file permissions",
        path.display()
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Registry file '{}' is corrupted: {reason}\nSuggestion: Remove the registry directory to rebuild it on the next run",
        path.display()
    )]
    Corrupted { path: PathBuf, reason: String },

    #[error(
        "Registry file '{}' has version {found}, newer than supported version {supported}\nSuggestion: Upgrade codedupe or remove the registry directory",
        path.display()
    )]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("Failed to serialize registry data: {0}")]
    Serialization(String),

    #[error("Registry directory '{}' is not writable: {reason}", path.display())]
    NotWritable { path: PathBuf, reason: String },
}
