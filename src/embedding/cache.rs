//! One-file-per-key embedding cache.
//!
//! Each entry lives at `<dir>/<key>.json`. Read and write failures on a single
//! entry never fail a run: they are logged, counted, and treated as a miss or
//! a skipped write.

use super::{EmbeddingBackend, EmbeddingError};
use crate::types::{CacheKey, get_utc_timestamp};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Record format written by this version.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const SECONDS_PER_HOUR: u64 = 3600;

/// On-disk cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEmbedding {
    pub version: u32,
    pub key: String,
    pub method: EmbeddingBackend,
    pub dimension: usize,
    /// UTC seconds
    pub created_at: u64,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub writes: u64,
}

#[derive(Debug)]
pub struct EmbeddingCache {
    dir: PathBuf,
    ttl_hours: u64,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    writes: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_hours: u64, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            ttl_hours,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cached vector for `key`, if present, fresh, and produced by the same
    /// method at the same dimension.
    pub fn get(&self, key: &CacheKey, method: EmbeddingBackend, dimension: usize) -> Option<Vec<f32>> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(key);
        let found = match self.read_entry(&path) {
            Ok(Some(entry)) => self.usable(entry, method, dimension),
            Ok(None) => None,
            Err(reason) => {
                warn!(path = %path.display(), %reason, "unreadable embedding cache entry");
                self.errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        match found {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn read_entry(&self, path: &Path) -> Result<Option<CachedEmbedding>, String> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.to_string()),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    fn usable(
        &self,
        entry: CachedEmbedding,
        method: EmbeddingBackend,
        dimension: usize,
    ) -> Option<Vec<f32>> {
        let age = get_utc_timestamp().saturating_sub(entry.created_at);
        if age > self.ttl_hours.saturating_mul(SECONDS_PER_HOUR) {
            debug!(key = %entry.key, age, "embedding cache entry expired");
            return None;
        }
        if entry.version > CACHE_FORMAT_VERSION {
            debug!(key = %entry.key, version = entry.version, "embedding cache entry from a newer format");
            return None;
        }
        if entry.method != method
            || entry.dimension != dimension
            || entry.vector.len() != dimension
        {
            debug!(key = %entry.key, "embedding cache entry from a different model");
            return None;
        }
        Some(entry.vector)
    }

    /// Store `vector` under `key`. Returns whether the entry was written.
    pub fn put(&self, key: &CacheKey, method: EmbeddingBackend, vector: &[f32]) -> bool {
        if !self.enabled {
            return false;
        }

        let entry = CachedEmbedding {
            version: CACHE_FORMAT_VERSION,
            key: key.to_string(),
            method,
            dimension: vector.len(),
            created_at: get_utc_timestamp(),
            vector: vector.to_vec(),
        };

        match self.write_entry(&self.entry_path(key), &entry) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to write embedding cache entry");
                self.errors.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn write_entry(&self, path: &Path, entry: &CachedEmbedding) -> Result<(), EmbeddingError> {
        let cache_error = |reason: String| EmbeddingError::Cache {
            path: path.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| cache_error(e.to_string()))?;
        let mut file = NamedTempFile::new_in(&self.dir).map_err(|e| cache_error(e.to_string()))?;
        serde_json::to_writer(&mut file, entry).map_err(|e| cache_error(e.to_string()))?;
        file.flush().map_err(|e| cache_error(e.to_string()))?;
        file.persist(path)
            .map_err(|e| cache_error(e.error.to_string()))?;
        Ok(())
    }

    fn entry_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
    }

    /// Remove entries created at or before `now - older_than_hours`.
    ///
    /// `None` and `Some(0)` remove every entry. Unreadable entries are
    /// always removed. Returns the number of files deleted.
    pub fn clear(&self, older_than_hours: Option<u64>) -> Result<usize, EmbeddingError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let cutoff = older_than_hours
            .filter(|hours| *hours > 0)
            .map(|hours| get_utc_timestamp().saturating_sub(hours.saturating_mul(SECONDS_PER_HOUR)));

        let mut removed = 0;
        for path in self.entry_files().collect::<Vec<_>>() {
            let expired = match cutoff {
                None => true,
                Some(cutoff) => match self.read_entry(&path) {
                    Ok(Some(entry)) => entry.created_at <= cutoff,
                    Ok(None) => false,
                    Err(_) => true,
                },
            };
            if !expired {
                continue;
            }

            std::fs::remove_file(&path).map_err(|e| EmbeddingError::Cache {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            removed += 1;
        }

        debug!(removed, dir = %self.dir.display(), "embedding cache cleared");
        Ok(removed)
    }

    /// Number of entry files currently on disk.
    pub fn entry_count(&self) -> usize {
        if !self.dir.exists() {
            return 0;
        }
        self.entry_files().count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }
}
