//! Configuration module for the duplicate finder.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.codedupe/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CODEDUPE_` and use double
//! underscores to separate nested levels:
//! - `CODEDUPE_DUPLICATES__HIGH=0.9` sets `duplicates.high`
//! - `CODEDUPE_EMBEDDING__BACKEND=hashing` sets `embedding.backend`
//! - `CODEDUPE_REGISTRY__STALE_THRESHOLD_HOURS=12` sets `registry.stale_threshold_hours`
//!
//! Every section is validated by [`Settings::validate`] before any pipeline
//! component is constructed.

use crate::duplicates::Thresholds;
use crate::embedding::EmbeddingBackend;
use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::types::SymbolKind;
use crate::vector::{BackendPreference, Metric};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding settings, cache and registry inside a project.
pub const CONFIG_DIR: &str = ".codedupe";
const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "CODEDUPE_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Project root that relative paths are resolved against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,

    #[serde(default)]
    pub duplicates: DuplicateConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Orchestrator settings: thresholds and symbol filtering.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DuplicateConfig {
    #[serde(default = "default_exact")]
    pub exact: f32,
    #[serde(default = "default_high")]
    pub high: f32,
    #[serde(default = "default_medium")]
    pub medium: f32,
    #[serde(default = "default_low")]
    pub low: f32,

    #[serde(default = "default_finder_batch_size")]
    pub batch_size: usize,

    /// Upper bound on symbols taken from a project-wide extraction
    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,

    /// Persist processed symbols to the registry after each run
    #[serde(default = "default_true")]
    pub enable_caching: bool,

    /// Reduce the analyzed set through registry change detection
    #[serde(default = "default_true")]
    pub enable_incremental: bool,

    /// Minimum trimmed `line_content` length for a symbol to be compared
    #[serde(default = "default_min_symbol_length")]
    pub min_symbol_length: usize,

    #[serde(default = "default_include_kinds")]
    pub include_symbol_kinds: Vec<SymbolKind>,

    /// Glob patterns matched against project-relative paths and file names
    #[serde(default = "default_exclude_patterns")]
    pub exclude_file_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// fastembed model name (ignored by the hashing backend)
    #[serde(default = "default_embedding_model")]
    pub model_name: String,

    /// Output dimension of the hashing backend
    #[serde(default = "default_hashing_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Maximum token length passed to the model
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default = "default_true")]
    pub normalize: bool,

    #[serde(default = "default_true")]
    pub enable_caching: bool,

    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Embedding cache directory, relative to the project root
    #[serde(default = "default_embedding_cache_dir")]
    pub cache_dir: PathBuf,

    /// Where downloaded model files live (defaults to the user cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_cache_dir: Option<PathBuf>,

    #[serde(default = "default_false")]
    pub use_gpu: bool,

    #[serde(default = "default_false")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimilarityConfig {
    /// Highest backend tier to probe first
    #[serde(default)]
    pub backend: BackendPreference,

    #[serde(default)]
    pub metric: Metric,

    #[serde(default = "default_true")]
    pub normalize_vectors: bool,

    /// Queries processed per batch during batch search
    #[serde(default = "default_similarity_batch_size")]
    pub batch_size: usize,

    /// Maximum matches returned per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_false")]
    pub include_self_matches: bool,

    #[serde(default = "default_false")]
    pub use_gpu: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistryConfig {
    /// Registry root, relative to the project root
    #[serde(default = "default_registry_dir")]
    pub registry_dir: PathBuf,

    /// Age after which cleanup evicts an entry
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Age after which an unchanged entry is refreshed anyway
    #[serde(default = "default_stale_threshold_hours")]
    pub stale_threshold_hours: u64,

    #[serde(default = "default_true")]
    pub track_file_changes: bool,

    #[serde(default = "default_hash_chunk_size")]
    pub hash_chunk_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_exact() -> f32 {
    0.95
}
fn default_high() -> f32 {
    0.85
}
fn default_medium() -> f32 {
    0.75
}
fn default_low() -> f32 {
    0.65
}
fn default_finder_batch_size() -> usize {
    100
}
fn default_max_symbols() -> usize {
    10_000
}
fn default_min_symbol_length() -> usize {
    10
}
fn default_include_kinds() -> Vec<SymbolKind> {
    vec![
        SymbolKind::Function,
        SymbolKind::Class,
        SymbolKind::Method,
        SymbolKind::Interface,
    ]
}
fn default_exclude_patterns() -> Vec<String> {
    [
        "test_*",
        "*_test.py",
        "*/test/*",
        "*.spec.*",
        "node_modules/*",
        ".git/*",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_hashing_dimension() -> usize {
    384
}
fn default_embedding_batch_size() -> usize {
    32
}
fn default_max_length() -> usize {
    512
}
fn default_cache_ttl_hours() -> u64 {
    168
}
fn default_embedding_cache_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("cache").join("embeddings")
}
fn default_similarity_batch_size() -> usize {
    1000
}
fn default_max_results() -> usize {
    100
}
fn default_registry_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("registry")
}
fn default_stale_threshold_hours() -> u64 {
    24
}
fn default_hash_chunk_size() -> usize {
    8192
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            project_root: None,
            duplicates: DuplicateConfig::default(),
            embedding: EmbeddingConfig::default(),
            similarity: SimilarityConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            exact: default_exact(),
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
            batch_size: default_finder_batch_size(),
            max_symbols: default_max_symbols(),
            enable_caching: true,
            enable_incremental: true,
            min_symbol_length: default_min_symbol_length(),
            include_symbol_kinds: default_include_kinds(),
            exclude_file_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model_name: default_embedding_model(),
            dimension: default_hashing_dimension(),
            batch_size: default_embedding_batch_size(),
            max_length: default_max_length(),
            normalize: true,
            enable_caching: true,
            cache_ttl_hours: default_cache_ttl_hours(),
            cache_dir: default_embedding_cache_dir(),
            model_cache_dir: None,
            use_gpu: false,
            show_download_progress: false,
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            metric: Metric::default(),
            normalize_vectors: true,
            batch_size: default_similarity_batch_size(),
            max_results: default_max_results(),
            include_self_matches: false,
            use_gpu: false,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_dir: default_registry_dir(),
            cache_ttl_hours: default_cache_ttl_hours(),
            stale_threshold_hours: default_stale_threshold_hours(),
            track_file_changes: true,
            hash_chunk_size: default_hash_chunk_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl DuplicateConfig {
    /// Validated, ordered threshold tiers.
    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(self.exact, self.high, self.medium, self.low)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds()?;
        require_positive("duplicates.batch_size", self.batch_size)?;
        require_positive("duplicates.max_symbols", self.max_symbols)?;
        if self.include_symbol_kinds.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "duplicates.include_symbol_kinds",
                reason: "at least one symbol kind must be included".to_string(),
            });
        }
        for pattern in &self.exclude_file_patterns {
            globset::Glob::new(pattern).map_err(|e| ConfigError::InvalidValue {
                field: "duplicates.exclude_file_patterns",
                reason: format!("'{pattern}' is not a valid glob: {e}"),
            })?;
        }
        Ok(())
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("embedding.batch_size", self.batch_size)?;
        require_positive("embedding.max_length", self.max_length)?;
        require_positive("embedding.dimension", self.dimension)?;
        require_positive("embedding.cache_ttl_hours", self.cache_ttl_hours as usize)?;
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "embedding.model_name",
                reason: "model name cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("similarity.batch_size", self.batch_size)?;
        require_positive("similarity.max_results", self.max_results)?;
        Ok(())
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("registry.cache_ttl_hours", self.cache_ttl_hours as usize)?;
        require_positive(
            "registry.stale_threshold_hours",
            self.stale_threshold_hours as usize,
        )?;
        require_positive("registry.hash_chunk_size", self.hash_chunk_size)?;
        Ok(())
    }
}

fn require_positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        let mut settings = Self::figment(&config_path)
            .extract::<Settings>()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;

        if settings.project_root.is_none() {
            settings.project_root = Self::workspace_root();
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Self::figment(path.as_ref())
            .extract::<Settings>()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for a `.codedupe` directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Directory containing the nearest `.codedupe` directory
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check every section; called by both loaders.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.duplicates.validate()?;
        self.embedding.validate()?;
        self.similarity.validate()?;
        self.registry.validate()?;
        Ok(())
    }

    /// Project root, falling back to the current directory.
    pub fn resolved_project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a configured path against the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.resolved_project_root().join(path)
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let save_error = |reason: String| ConfigError::Save {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_error(e.to_string()))?;
        }
        let toml_string = toml::to_string_pretty(self).map_err(|e| save_error(e.to_string()))?;
        std::fs::write(path, toml_string).map_err(|e| save_error(e.to_string()))?;

        Ok(())
    }

    /// Write a default settings file under `root/.codedupe`
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = root.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists { path: config_path });
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.duplicates.exact, 0.95);
        assert_eq!(settings.duplicates.low, 0.65);
        assert_eq!(settings.duplicates.min_symbol_length, 10);
        assert_eq!(settings.embedding.batch_size, 32);
        assert_eq!(settings.embedding.cache_ttl_hours, 168);
        assert_eq!(settings.similarity.max_results, 100);
        assert_eq!(settings.registry.stale_threshold_hours, 24);
        assert_eq!(settings.registry.hash_chunk_size, 8192);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.duplicates.high = 0.9;
        settings.embedding.backend = EmbeddingBackend::Hashing;
        settings.similarity.metric = Metric::L2;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.duplicates.high, 0.9);
        assert_eq!(loaded.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(loaded.similarity.metric, Metric::L2);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[duplicates]
medium = 0.8
include_symbol_kinds = ["function"]

[similarity]
backend = "manual"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        assert_eq!(settings.duplicates.medium, 0.8);
        assert_eq!(
            settings.duplicates.include_symbol_kinds,
            vec![SymbolKind::Function]
        );
        assert_eq!(settings.similarity.backend, BackendPreference::Manual);

        // Defaults survive
        assert_eq!(settings.duplicates.exact, 0.95);
        assert!(!settings.duplicates.exclude_file_patterns.is_empty());
    }

    #[test]
    fn test_unordered_thresholds_rejected_at_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[duplicates]\nhigh = 0.7\n").unwrap();

        let err = Settings::load_from(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThresholds { .. }));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut settings = Settings::default();
        settings.embedding.batch_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue {
                field: "embedding.batch_size",
                ..
            })
        ));

        let mut settings = Settings::default();
        settings.registry.cache_ttl_hours = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.duplicates.exclude_file_patterns = vec!["[unclosed".to_string()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_init_config_file() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(matches!(
            Settings::init_config_file(temp_dir.path(), false),
            Err(ConfigError::AlreadyExists { .. })
        ));
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_resolve_path_against_project_root() {
        let settings = Settings {
            project_root: Some(PathBuf::from("/work/project")),
            ..Settings::default()
        };

        assert_eq!(
            settings.resolve_path(Path::new(".codedupe/registry")),
            PathBuf::from("/work/project/.codedupe/registry")
        );
        assert_eq!(
            settings.resolve_path(Path::new("/tmp/cache")),
            PathBuf::from("/tmp/cache")
        );
    }

    #[test]
    fn test_layered_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[embedding]\nbatch_size = 8\nmax_length = 256\n").unwrap();

        // Env var names are unique to this test
        unsafe {
            std::env::set_var("CODEDUPE_EMBEDDING__BATCH_SIZE", "16");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        // Environment variable overrides the file
        assert_eq!(settings.embedding.batch_size, 16);
        // File value is used when no env var is set
        assert_eq!(settings.embedding.max_length, 256);

        unsafe {
            std::env::remove_var("CODEDUPE_EMBEDDING__BATCH_SIZE");
        }
    }
}
