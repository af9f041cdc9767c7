//! Type-safe wrappers and core types for similarity search.
//!
//! Scores, dimensions and backend tiers are newtypes or enums rather than
//! bare floats and strings, so a tier name or a metric can never be misspelled
//! at a call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Type-safe wrapper for similarity scores.
///
/// Scores are normalized to the range [0.0, 1.0] where:
/// - 1.0 indicates perfect similarity
/// - 0.0 indicates no similarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(f32);

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is not in the range [0.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in range [0.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Clamps any raw backend value into [0.0, 1.0]; NaN maps to 0.0.
    #[must_use]
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Creates a score of 0.0 (no similarity).
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Creates a score of 1.0 (perfect similarity).
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Construction rules out NaN, total_cmp keeps this panic-free anyway
        self.0.total_cmp(&other.0)
    }
}

/// Type-safe wrapper for vector dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Distance used by the flat index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Inner product over unit-normalized rows, equal to cosine similarity.
    #[default]
    InnerProduct,
    /// Euclidean distance mapped to similarity as `1 / (1 + d)`.
    L2,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::InnerProduct => f.write_str("inner_product"),
            Metric::L2 => f.write_str("l2"),
        }
    }
}

/// Concrete backend tier, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendTier {
    /// Exact nearest neighbor over a contiguous matrix, parallel scoring.
    Flat,
    /// Cosine via cached norms and matrix-vector products.
    Pairwise,
    /// Plain per-pair cosine.
    Manual,
}

impl BackendTier {
    pub const ORDERED: [BackendTier; 3] =
        [BackendTier::Flat, BackendTier::Pairwise, BackendTier::Manual];

    /// Confidence attached to every match produced by this tier.
    #[must_use]
    pub fn confidence(&self) -> f32 {
        match self {
            BackendTier::Flat => 0.95,
            BackendTier::Pairwise => 0.85,
            BackendTier::Manual => 0.75,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendTier::Flat => "flat",
            BackendTier::Pairwise => "pairwise",
            BackendTier::Manual => "manual",
        }
    }

    /// This tier and every weaker one, in probing order.
    pub fn and_below(self) -> impl Iterator<Item = BackendTier> {
        Self::ORDERED.into_iter().filter(move |tier| *tier >= self)
    }
}

impl fmt::Display for BackendTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured starting point for backend probing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    #[default]
    Auto,
    Flat,
    Pairwise,
    Manual,
}

impl BackendPreference {
    #[must_use]
    pub fn starting_tier(&self) -> BackendTier {
        match self {
            BackendPreference::Auto | BackendPreference::Flat => BackendTier::Flat,
            BackendPreference::Pairwise => BackendTier::Pairwise,
            BackendPreference::Manual => BackendTier::Manual,
        }
    }
}

/// A single neighbor returned by a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Row of the query when it is part of the index
    pub query_index: Option<usize>,
    pub match_index: usize,
    pub similarity_score: f32,
    pub confidence: f32,
    /// Raw backend value before mapping to similarity
    pub distance: f32,
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error(
        "Embedding count {embeddings} does not match symbol count {symbols}\nSuggestion: Pass exactly one embedding per symbol"
    )]
    CountMismatch { embeddings: usize, symbols: usize },

    #[error("Failed to build {backend} index: {reason}")]
    BuildFailed {
        backend: BackendTier,
        reason: String,
    },

    #[error(
        "No similarity backend passed its self-test (last failure: {reason})\nSuggestion: Check available memory and thread limits"
    )]
    NoBackendAvailable { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_validation() {
        let score = Score::new(0.5).unwrap();
        assert_eq!(score.get(), 0.5);
        assert_eq!(Score::zero().get(), 0.0);
        assert_eq!(Score::one().get(), 1.0);

        assert!(Score::new(-0.1).is_err());
        assert!(Score::new(1.1).is_err());
        assert!(Score::new(f32::NAN).is_err());
    }

    #[test]
    fn test_score_clamping() {
        assert_eq!(Score::clamped(1.0000002).get(), 1.0);
        assert_eq!(Score::clamped(-0.3).get(), 0.0);
        assert_eq!(Score::clamped(f32::NAN).get(), 0.0);
        assert_eq!(Score::clamped(0.42).get(), 0.42);
        assert!(Score::clamped(0.9) > Score::clamped(0.1));
    }

    #[test]
    fn test_vector_dimension() {
        let dim = VectorDimension::new(384).unwrap();
        assert_eq!(dim.get(), 384);
        assert!(VectorDimension::new(0).is_err());

        assert!(dim.validate_vector(&vec![0.1; 384]).is_ok());
        assert!(matches!(
            dim.validate_vector(&vec![0.1; 100]),
            Err(VectorError::DimensionMismatch {
                expected: 384,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_tier_order_and_confidence() {
        let from_pairwise: Vec<_> = BackendTier::Pairwise.and_below().collect();
        assert_eq!(from_pairwise, vec![BackendTier::Pairwise, BackendTier::Manual]);
        assert_eq!(BackendTier::Flat.and_below().count(), 3);

        assert!(BackendTier::Flat.confidence() > BackendTier::Pairwise.confidence());
        assert!(BackendTier::Pairwise.confidence() > BackendTier::Manual.confidence());
        assert_eq!(
            BackendPreference::Auto.starting_tier(),
            BackendTier::Flat
        );
    }

    #[test]
    fn test_metric_serde() {
        assert_eq!(
            serde_json::to_string(&Metric::InnerProduct).unwrap(),
            "\"inner_product\""
        );
        let metric: Metric = serde_json::from_str("\"l2\"").unwrap();
        assert_eq!(metric, Metric::L2);
    }
}
