use super::{
    CacheStats, EmbeddingBackend, EmbeddingCache, EmbeddingError, EmbeddingModel, create_model,
};
use crate::config::EmbeddingConfig;
use crate::symbol::Symbol;
use crate::types::{CacheKey, sha256_hex};
use crate::vector::{Score, cosine_similarity, normalize_vector};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

const HEALTH_PROBE: &str = "name: health_check | type: function | content: def health_check(): return True";

/// Fields that change what a model produces for the same text.
#[derive(Serialize)]
struct ConfigFingerprint<'a> {
    model_name: &'a str,
    normalize: bool,
    max_length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedderInfo {
    pub method: EmbeddingBackend,
    pub model_name: String,
    pub dimension: usize,
    pub config_hash: String,
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    pub cache_entries: usize,
    pub cache_stats: CacheStats,
    pub batch_size: usize,
    pub normalize: bool,
    pub cache_ttl_hours: u64,
}

/// Embeds symbols through the cache and the configured model.
pub struct SymbolEmbedder {
    config: EmbeddingConfig,
    model: Box<dyn EmbeddingModel>,
    cache: EmbeddingCache,
    config_hash: String,
}

impl std::fmt::Debug for SymbolEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolEmbedder")
            .field("method", &self.model.method())
            .field("model", &self.model.model_name())
            .field("dimension", &self.model.dimension())
            .field("cache", &self.cache)
            .finish()
    }
}

impl SymbolEmbedder {
    /// Load the configured model. `cache_dir` is the resolved cache location.
    pub fn new(config: &EmbeddingConfig, cache_dir: impl Into<PathBuf>) -> Result<Self, EmbeddingError> {
        let model = create_model(config)?;
        Ok(Self::with_model(config, model, cache_dir))
    }

    pub fn with_model(
        config: &EmbeddingConfig,
        model: Box<dyn EmbeddingModel>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        let cache = EmbeddingCache::new(cache_dir, config.cache_ttl_hours, config.enable_caching);
        let config_hash = config_hash(config);
        info!(
            method = %model.method(),
            model = model.model_name(),
            dimension = model.dimension(),
            config_hash = %config_hash,
            "symbol embedder ready"
        );
        Self {
            config: config.clone(),
            model,
            cache,
            config_hash,
        }
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn method(&self) -> EmbeddingBackend {
        self.model.method()
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Embeddings for `symbols`, one per symbol and in input order.
    ///
    /// Cached vectors are reused; only misses reach the model, in batches of
    /// `batch_size`.
    pub fn generate_embeddings(&self, symbols: &[Symbol]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let method = self.model.method();
        let dimension = self.model.dimension();

        let texts: Vec<String> = symbols.iter().map(Symbol::canonical_text).collect();
        let keys: Vec<CacheKey> = texts
            .iter()
            .map(|text| CacheKey::derive(text, &self.config_hash))
            .collect();

        let mut results: Vec<Option<Vec<f32>>> = keys
            .iter()
            .map(|key| self.cache.get(key, method, dimension))
            .collect();
        let misses: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, cached)| cached.is_none().then_some(i))
            .collect();

        debug!(
            total = symbols.len(),
            cached = symbols.len() - misses.len(),
            to_embed = misses.len(),
            "embedding cache lookup"
        );

        for batch in misses.chunks(self.config.batch_size.max(1)) {
            let batch_texts: Vec<&str> = batch.iter().map(|&i| texts[i].as_str()).collect();
            let vectors = self.model.embed(&batch_texts)?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::Generation(format!(
                    "model returned {} vectors for a batch of {}",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (&i, mut vector) in batch.iter().zip(vectors) {
                if vector.len() != dimension {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                if self.config.normalize {
                    normalize_vector(&mut vector);
                }
                self.cache.put(&keys[i], method, &vector);
                results[i] = Some(vector);
            }
        }

        let embeddings = results
            .into_iter()
            .enumerate()
            .map(|(i, vector)| {
                vector.ok_or_else(|| {
                    EmbeddingError::Generation(format!("no embedding produced for symbol {i}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            symbols = embeddings.len(),
            embedded = misses.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embeddings generated"
        );
        Ok(embeddings)
    }

    /// Remove cache entries older than the given age (`None` clears all).
    pub fn clear_cache(&self, older_than_hours: Option<u64>) -> Result<usize, EmbeddingError> {
        let removed = self.cache.clear(older_than_hours)?;
        info!(removed, "embedding cache cleared");
        Ok(removed)
    }

    /// Cosine similarity clamped to [0, 1]; 0 for mismatched lengths.
    pub fn compute_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        Score::clamped(cosine_similarity(a, b)).get()
    }

    /// Embed a probe text and check the model still answers at its dimension.
    pub fn health_check(&self) -> Result<(), EmbeddingError> {
        let vectors = self.model.embed(&[HEALTH_PROBE])?;
        let actual = vectors.first().map(Vec::len).unwrap_or(0);
        if actual != self.model.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.model.dimension(),
                actual,
            });
        }
        Ok(())
    }

    pub fn engine_info(&self) -> EmbedderInfo {
        EmbedderInfo {
            method: self.model.method(),
            model_name: self.model.model_name().to_string(),
            dimension: self.model.dimension(),
            config_hash: self.config_hash.clone(),
            cache_enabled: self.cache.is_enabled(),
            cache_dir: self.cache.dir().to_path_buf(),
            cache_entries: self.cache.entry_count(),
            cache_stats: self.cache.stats(),
            batch_size: self.config.batch_size,
            normalize: self.config.normalize,
            cache_ttl_hours: self.config.cache_ttl_hours,
        }
    }

    pub fn reset_stats(&self) {
        self.cache.reset_stats();
    }
}

/// First 8 hex chars of the SHA256 over the output-affecting settings.
fn config_hash(config: &EmbeddingConfig) -> String {
    let fingerprint = ConfigFingerprint {
        model_name: &config.model_name,
        normalize: config.normalize,
        max_length: config.max_length,
    };
    // Serializing a plain struct of strings and numbers cannot fail
    let json = serde_json::to_string(&fingerprint).unwrap_or_default();
    let mut hash = sha256_hex(json);
    hash.truncate(8);
    hash
}
