//! Embedding backends.

use super::{EmbeddingBackend, EmbeddingError};
use crate::config::EmbeddingConfig;
use crate::vector::normalize_vector;
use fastembed::{EmbeddingModel as FastEmbedModelKind, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};

/// Model names accepted by `embedding.model_name`.
pub const SUPPORTED_MODELS: &[&str] = &[
    "AllMiniLML6V2",
    "AllMiniLML12V2",
    "BGESmallENV15",
    "BGEBaseENV15",
    "ParaphraseMLMiniLML12V2",
    "MultilingualE5Small",
];

/// Text to vector model. Implementations must be thread-safe.
pub trait EmbeddingModel: Send + Sync {
    /// One vector per text, in input order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    #[must_use]
    fn dimension(&self) -> usize;

    /// Short method tag recorded with every cached vector.
    fn method(&self) -> EmbeddingBackend;

    fn model_name(&self) -> &str;
}

/// Map a configured model name onto a fastembed model.
pub fn parse_model_name(name: &str) -> Result<FastEmbedModelKind, EmbeddingError> {
    let model = match name {
        "AllMiniLML6V2" => FastEmbedModelKind::AllMiniLML6V2,
        "AllMiniLML12V2" => FastEmbedModelKind::AllMiniLML12V2,
        "BGESmallENV15" => FastEmbedModelKind::BGESmallENV15,
        "BGEBaseENV15" => FastEmbedModelKind::BGEBaseENV15,
        "ParaphraseMLMiniLML12V2" => FastEmbedModelKind::ParaphraseMLMiniLML12V2,
        "MultilingualE5Small" => FastEmbedModelKind::MultilingualE5Small,
        other => {
            return Err(EmbeddingError::UnknownModel {
                name: other.to_string(),
            });
        }
    };
    Ok(model)
}

/// Default location for downloaded model files.
fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("codedupe").join("models"))
        .unwrap_or_else(|| PathBuf::from(crate::config::CONFIG_DIR).join("models"))
}

/// Build the model named by `config.backend`.
///
/// There is no fallback between backends: a fastembed model that cannot be
/// loaded is an error.
pub fn create_model(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingModel>, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::FastEmbed => Ok(Box::new(FastEmbedModel::new(config)?)),
        EmbeddingBackend::Hashing => Ok(Box::new(HashingEmbedder::new(config.dimension)?)),
    }
}

/// Sentence-embedding model running through ONNX Runtime.
pub struct FastEmbedModel {
    model: Mutex<TextEmbedding>,
    name: String,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedModel")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("model", &"<TextEmbedding>")
            .finish()
    }
}

impl FastEmbedModel {
    /// Load (downloading on first use) the configured model.
    ///
    /// The output dimension is measured by embedding a probe text.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let kind = parse_model_name(&config.model_name)?;
        let cache_dir = config
            .model_cache_dir
            .clone()
            .unwrap_or_else(default_model_dir);

        if config.use_gpu {
            debug!("GPU execution providers are not configured; running the model on CPU");
        }
        info!(model = %config.model_name, cache_dir = %cache_dir.display(), "loading embedding model");

        let init_error = |reason: String| EmbeddingError::ModelInit {
            model: config.model_name.clone(),
            reason,
        };

        let mut model = TextEmbedding::try_new(
            InitOptions::new(kind)
                .with_cache_dir(cache_dir)
                .with_max_length(config.max_length)
                .with_show_download_progress(config.show_download_progress),
        )
        .map_err(|e| init_error(e.to_string()))?;

        let probe = model
            .embed(vec!["test"], None)
            .map_err(|e| init_error(format!("probe embedding failed: {e}")))?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .filter(|len| *len > 0)
            .ok_or_else(|| init_error("probe embedding was empty".to_string()))?;

        Ok(Self {
            model: Mutex::new(model),
            name: config.model_name.clone(),
            dimension,
        })
    }
}

impl EmbeddingModel for FastEmbedModel {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Generation(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::Generation(format!(
                "model returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn method(&self) -> EmbeddingBackend {
        EmbeddingBackend::FastEmbed
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Offline embedder: signed feature hashing of words and character trigrams.
///
/// Identical text always maps to the identical vector, and texts sharing
/// identifiers or substrings land close together. Vectors are unit length.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::ModelInit {
                model: "feature-hashing".to_string(),
                reason: "dimension must be greater than zero".to_string(),
            });
        }
        Ok(Self { dimension })
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(bytes);

        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, &format!("w:{word}"), 1.0);
        }

        let chars: Vec<char> = lowered.chars().filter(|c| !c.is_whitespace()).collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            self.add_feature(&mut vector, &format!("t:{trigram}"), 0.5);
        }

        normalize_vector(&mut vector);
        vector
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn method(&self) -> EmbeddingBackend {
        EmbeddingBackend::Hashing
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }
}
