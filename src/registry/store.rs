use super::entry::RegistryEntry;
use super::file_hash::{hash_file, normalize_path};
use super::index_doc::{FileHashes, RegistryIndex, read_json, write_json_atomic};
use super::{ChangeType, RegistryError, RegistryStatus};
use crate::config::RegistryConfig;
use crate::symbol::Symbol;
use crate::types::{EntryKey, get_utc_timestamp};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SECONDS_PER_HOUR: u64 = 3600;
const INDEX_FILE: &str = "index.json";
const SYMBOLS_DIR: &str = "symbols";
const METADATA_DIR: &str = "metadata";
const HASHES_FILE: &str = "file_hashes.json";

#[derive(Debug, Default, Clone, Copy)]
struct OpTiming {
    count: u64,
    total_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub status: RegistryStatus,
    pub registry_dir: PathBuf,
    pub symbols_count: usize,
    pub files_tracked: usize,
    pub created_at: u64,
    pub last_updated: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
    pub entry_files: usize,
    pub storage_bytes: u64,
    /// Mean wall time per operation name, in milliseconds
    pub average_operation_ms: BTreeMap<String, f64>,
    pub config: RegistryConfig,
}

/// File-backed registry of processed symbols.
///
/// Writes go straight to disk through temp-file renames; one process owns the
/// registry directory at a time.
#[derive(Debug)]
pub struct RegistryStore {
    config: RegistryConfig,
    project_root: PathBuf,
    root: PathBuf,
    index: RegistryIndex,
    file_hashes: FileHashes,
    entries: HashMap<EntryKey, RegistryEntry>,
    hits: u64,
    misses: u64,
    errors: u64,
    timings: BTreeMap<&'static str, OpTiming>,
}

impl RegistryStore {
    /// Open (creating if needed) the registry for `project_root`.
    ///
    /// A corrupted `index.json` or hash map is an error; corrupted entry
    /// files are not.
    pub fn open(config: &RegistryConfig, project_root: &Path) -> Result<Self, RegistryError> {
        let root = if config.registry_dir.is_absolute() {
            config.registry_dir.clone()
        } else {
            project_root.join(&config.registry_dir)
        };

        for dir in [root.join(SYMBOLS_DIR), root.join(METADATA_DIR)] {
            std::fs::create_dir_all(&dir).map_err(|source| RegistryError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            RegistryIndex::load(&index_path)?
        } else {
            let index = RegistryIndex::new();
            index.save(&index_path)?;
            index
        };

        let hashes_path = root.join(METADATA_DIR).join(HASHES_FILE);
        let file_hashes = if hashes_path.exists() {
            read_json(&hashes_path)?
        } else {
            FileHashes::new()
        };

        info!(
            registry = %root.display(),
            symbols = index.symbols_count,
            files = index.files_tracked.len(),
            "registry opened"
        );

        Ok(Self {
            config: config.clone(),
            project_root: project_root.to_path_buf(),
            root,
            index,
            file_hashes,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            errors: 0,
            timings: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &RegistryIndex {
        &self.index
    }

    pub fn entry_count(&self) -> usize {
        self.index.symbols_count
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn hashes_path(&self) -> PathBuf {
        self.root.join(METADATA_DIR).join(HASHES_FILE)
    }

    fn symbols_dir(&self) -> PathBuf {
        self.root.join(SYMBOLS_DIR)
    }

    fn entry_path(&self, key: &EntryKey) -> PathBuf {
        self.symbols_dir().join(format!("{key}.json"))
    }

    /// Normalized project-relative path for a symbol's `file_path`.
    pub fn normalize(&self, file_path: &str) -> String {
        normalize_path(&self.project_root, Path::new(file_path))
    }

    pub fn entry_key(&self, file_path: &str, name: &str) -> EntryKey {
        EntryKey::derive(&self.normalize(file_path), name)
    }

    fn absolute(&self, normalized: &str) -> PathBuf {
        let path = Path::new(normalized);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    fn current_hash(&self, normalized: &str) -> Option<String> {
        hash_file(&self.absolute(normalized), self.config.hash_chunk_size).ok()
    }

    /// Compare a file with its recorded hash.
    pub fn detect_file_change(&self, file_path: &str) -> ChangeType {
        let normalized = self.normalize(file_path);
        classify_change(
            self.file_hashes.get(&normalized).map(String::as_str),
            self.current_hash(&normalized).as_deref(),
        )
    }

    fn record(&mut self, operation: &'static str, started: Instant) {
        let timing = self.timings.entry(operation).or_default();
        timing.count += 1;
        timing.total_ms += started.elapsed().as_secs_f64() * 1000.0;
    }

    fn read_entry_file(path: &Path) -> Result<Option<RegistryEntry>, String> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.to_string()),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    /// Entry for `key`; unreadable files count as an error and read as absent.
    fn load_entry(&mut self, key: &EntryKey) -> Option<RegistryEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Some(entry.clone());
        }

        let path = self.entry_path(key);
        match Self::read_entry_file(&path) {
            Ok(Some(entry)) => {
                self.entries.insert(key.clone(), entry.clone());
                Some(entry)
            }
            Ok(None) => None,
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping unreadable registry entry");
                self.errors += 1;
                None
            }
        }
    }

    fn write_entry(
        &mut self,
        symbol: &Symbol,
        embedding: Option<Vec<f32>>,
        metadata: Map<String, Value>,
        file_hash: Option<String>,
    ) -> Result<EntryKey, RegistryError> {
        let normalized = self.normalize(&symbol.file_path);
        let key = EntryKey::derive(&normalized, &symbol.name);
        let entry = RegistryEntry::new(symbol.clone(), embedding, metadata, file_hash.clone());

        write_json_atomic(&self.entry_path(&key), &entry)?;
        self.index.track(&normalized, key.as_str());
        if let Some(hash) = file_hash.filter(|_| self.config.track_file_changes) {
            self.file_hashes.insert(normalized, hash);
        }
        self.entries.insert(key.clone(), entry);
        Ok(key)
    }

    fn flush(&self) -> Result<(), RegistryError> {
        self.index.save(&self.index_path())?;
        write_json_atomic(&self.hashes_path(), &self.file_hashes)
    }

    /// Store one symbol with its embedding and metadata.
    pub fn register_symbol(
        &mut self,
        symbol: &Symbol,
        embedding: Option<Vec<f32>>,
        metadata: Map<String, Value>,
    ) -> Result<bool, RegistryError> {
        let started = Instant::now();
        let file_hash = self.current_hash(&self.normalize(&symbol.file_path));
        self.write_entry(symbol, embedding, metadata, file_hash)?;
        self.flush()?;
        self.record("register_symbol", started);
        Ok(true)
    }

    /// Store many symbols, hashing each file once and rewriting the index
    /// once at the end. Returns how many entries were written.
    pub fn register_symbols<'a, I>(&mut self, items: I) -> Result<usize, RegistryError>
    where
        I: IntoIterator<Item = (&'a Symbol, Option<Vec<f32>>, Map<String, Value>)>,
    {
        let started = Instant::now();
        let mut hashes: HashMap<String, Option<String>> = HashMap::new();
        let mut written = 0;

        for (symbol, embedding, metadata) in items {
            let normalized = self.normalize(&symbol.file_path);
            let file_hash = match hashes.get(&normalized) {
                Some(hash) => hash.clone(),
                None => {
                    let hash = self.current_hash(&normalized);
                    hashes.insert(normalized, hash.clone());
                    hash
                }
            };
            self.write_entry(symbol, embedding, metadata, file_hash)?;
            written += 1;
        }

        self.flush()?;
        self.record("register_symbols", started);
        debug!(written, "registry entries written");
        Ok(written)
    }

    pub fn get_symbol(
        &mut self,
        file_path: &str,
        name: &str,
    ) -> Result<Option<RegistryEntry>, RegistryError> {
        let started = Instant::now();
        let key = self.entry_key(file_path, name);
        let entry = self.load_entry(&key);
        if entry.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        self.record("get_symbol", started);
        Ok(entry)
    }

    /// Refresh entries for `symbols`, returning entry key -> whether the
    /// entry was (re)registered by this call.
    ///
    /// Symbols in files whose hash is unchanged are skipped. Elsewhere a
    /// symbol is re-registered when it has no entry, its line content or
    /// number moved, or its entry is older than `stale_threshold_hours`; the
    /// previous embedding and metadata are carried over.
    pub fn update_symbols(
        &mut self,
        symbols: &[Symbol],
    ) -> Result<BTreeMap<String, bool>, RegistryError> {
        let started = Instant::now();
        let now = get_utc_timestamp();
        let stale_after = self
            .config
            .stale_threshold_hours
            .saturating_mul(SECONDS_PER_HOUR);

        let mut by_file: BTreeMap<String, Vec<&Symbol>> = BTreeMap::new();
        for symbol in symbols {
            by_file
                .entry(self.normalize(&symbol.file_path))
                .or_default()
                .push(symbol);
        }

        let mut results = BTreeMap::new();
        let mut changed_files = 0;

        for (path, group) in by_file {
            let current = self.current_hash(&path);
            let change = if self.config.track_file_changes {
                classify_change(
                    self.file_hashes.get(&path).map(String::as_str),
                    current.as_deref(),
                )
            } else {
                ChangeType::Modified
            };

            if change == ChangeType::Unchanged {
                for symbol in group {
                    let key = EntryKey::derive(&path, &symbol.name);
                    results.entry(key.to_string()).or_insert(false);
                }
                continue;
            }

            changed_files += 1;
            debug!(file = %path, ?change, symbols = group.len(), "file changed");

            for symbol in group {
                let key = EntryKey::derive(&path, &symbol.name);
                let existing = self.load_entry(&key);
                let refresh = existing
                    .as_ref()
                    .is_none_or(|entry| entry.needs_refresh(symbol, now, stale_after));

                if refresh {
                    let (embedding, metadata) = existing
                        .map(|entry| (entry.embedding, entry.similarity_metadata))
                        .unwrap_or_default();
                    self.write_entry(symbol, embedding, metadata, current.clone())?;
                }
                *results.entry(key.to_string()).or_insert(false) |= refresh;
            }

            if self.config.track_file_changes {
                match (change, current) {
                    (ChangeType::Deleted, _) => {
                        self.file_hashes.remove(&path);
                    }
                    (_, Some(hash)) => {
                        self.file_hashes.insert(path, hash);
                    }
                    (_, None) => {}
                }
            }
        }

        self.flush()?;
        self.record("update_symbols", started);

        let updated = results.values().filter(|updated| **updated).count();
        info!(
            symbols = results.len(),
            updated,
            changed_files,
            "registry change detection complete"
        );
        Ok(results)
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        WalkDir::new(self.symbols_dir())
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    /// Delete entries last updated at or before `now - older_than_hours`.
    ///
    /// `None` uses `cache_ttl_hours`; `Some(0)` removes everything. Returns
    /// the number of distinct entries removed.
    pub fn cleanup_stale_entries(
        &mut self,
        older_than_hours: Option<u64>,
    ) -> Result<usize, RegistryError> {
        let started = Instant::now();
        let hours = older_than_hours.unwrap_or(self.config.cache_ttl_hours);
        let cutoff = (hours > 0).then(|| {
            get_utc_timestamp().saturating_sub(hours.saturating_mul(SECONDS_PER_HOUR))
        });

        let mut removed: BTreeSet<String> = BTreeSet::new();
        for path in self.entry_files() {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let expired = match Self::read_entry_file(&path) {
                Ok(Some(entry)) => cutoff.is_none_or(|cutoff| entry.last_updated <= cutoff),
                Ok(None) => false,
                Err(reason) => {
                    warn!(path = %path.display(), %reason, "removing unreadable registry entry");
                    self.errors += 1;
                    true
                }
            };
            if !expired {
                continue;
            }

            std::fs::remove_file(&path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            removed.insert(stem.to_string());
        }

        for stem in &removed {
            if let Some(key) = EntryKey::from_stem(stem) {
                self.entries.remove(&key);
            }
        }
        for emptied in self.index.untrack(&removed) {
            self.file_hashes.remove(&emptied);
        }

        self.flush()?;
        self.record("cleanup_stale_entries", started);
        info!(removed = removed.len(), hours, "stale registry entries removed");
        Ok(removed.len())
    }

    /// Tracked files whose content hash changed or that no longer exist.
    pub fn changed_tracked_files(&self) -> Vec<PathBuf> {
        self.file_hashes
            .iter()
            .filter(|(path, stored)| self.current_hash(path).as_ref() != Some(*stored))
            .map(|(path, _)| PathBuf::from(path))
            .collect()
    }

    pub fn status(&self) -> RegistryStatus {
        if !self.root.is_dir() {
            return RegistryStatus::Missing;
        }
        let Ok(index) = RegistryIndex::load(&self.index_path()) else {
            return RegistryStatus::Corrupted;
        };
        let stale_after = self
            .config
            .stale_threshold_hours
            .saturating_mul(SECONDS_PER_HOUR);
        if get_utc_timestamp().saturating_sub(index.last_updated) > stale_after {
            RegistryStatus::Stale
        } else {
            RegistryStatus::Healthy
        }
    }

    /// Directories exist and accept writes, and the index is readable.
    pub fn health_check(&self) -> Result<(), RegistryError> {
        for dir in [
            self.root.clone(),
            self.symbols_dir(),
            self.root.join(METADATA_DIR),
        ] {
            if !dir.is_dir() {
                return Err(RegistryError::NotWritable {
                    path: dir,
                    reason: "directory does not exist".to_string(),
                });
            }
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| RegistryError::NotWritable {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }
        RegistryIndex::load(&self.index_path())?;
        Ok(())
    }

    pub fn stats(&self) -> RegistryStats {
        let files = self.entry_files();
        let storage_bytes = files
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();

        RegistryStats {
            status: self.status(),
            registry_dir: self.root.clone(),
            symbols_count: self.index.symbols_count,
            files_tracked: self.index.files_tracked.len(),
            created_at: self.index.created_at,
            last_updated: self.index.last_updated,
            cache_hits: self.hits,
            cache_misses: self.misses,
            errors: self.errors,
            entry_files: files.len(),
            storage_bytes,
            average_operation_ms: self
                .timings
                .iter()
                .map(|(name, t)| (name.to_string(), t.total_ms / t.count.max(1) as f64))
                .collect(),
            config: self.config.clone(),
        }
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.errors = 0;
        self.timings.clear();
    }
}

fn classify_change(stored: Option<&str>, current: Option<&str>) -> ChangeType {
    match (stored, current) {
        (Some(stored), Some(current)) if stored == current => ChangeType::Unchanged,
        (Some(_), Some(_)) => ChangeType::Modified,
        (Some(_), None) => ChangeType::Deleted,
        (None, _) => ChangeType::Added,
    }
}
