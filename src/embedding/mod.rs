//! Symbol embeddings with an on-disk cache.
//!
//! [`SymbolEmbedder`] turns symbols into canonical text, looks each text up in
//! the [`EmbeddingCache`], and embeds only the misses through the configured
//! [`EmbeddingModel`]. Exactly one model is active per run; a model that fails
//! to initialize aborts construction instead of degrading to another method.

mod cache;
mod engine;
mod model;

pub use cache::{CacheStats, CachedEmbedding, EmbeddingCache};
pub use engine::{EmbedderInfo, SymbolEmbedder};
pub use model::{
    EmbeddingModel, FastEmbedModel, HashingEmbedder, SUPPORTED_MODELS, create_model,
    parse_model_name,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Which embedding method a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// ONNX sentence-embedding model via fastembed
    #[default]
    FastEmbed,
    /// Deterministic feature hashing, no model download
    Hashing,
}

impl EmbeddingBackend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingBackend::FastEmbed => "fastembed",
            EmbeddingBackend::Hashing => "hashing",
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingBackend {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fastembed" => Ok(EmbeddingBackend::FastEmbed),
            "hashing" => Ok(EmbeddingBackend::Hashing),
            _ => Err("expected 'fastembed' or 'hashing'"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model '{model}': {reason}\nSuggestion: Ensure you have internet connection for first-time model download, or set embedding.backend = \"hashing\""
    )]
    ModelInit { model: String, reason: String },

    #[error(
        "Unknown embedding model '{name}'\nSuggestion: Use one of: {}",
        SUPPORTED_MODELS.join(", ")
    )]
    UnknownModel { name: String },

    #[error("Embedding generation failed: {0}")]
    Generation(String),

    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: Clear the embedding cache after changing models"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding cache error at '{}': {reason}", path.display())]
    Cache { path: PathBuf, reason: String },
}
