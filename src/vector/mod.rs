//! Similarity search over symbol embeddings.
//!
//! Three interchangeable backend tiers share one [`VectorIndex`] contract.
//! [`SimilarityDetector`] picks the best tier that passes a self-test and
//! layers batch search and pair de-duplication on top.

mod detector;
pub mod index;
pub mod similarity;
mod types;

pub use detector::{DetectorInfo, SimilarityDetector};
pub use index::{VectorIndex, create_backend, select_backend};
pub use similarity::{cosine_similarity, normalize_vector};
pub use types::{
    BackendPreference, BackendTier, Metric, Score, SimilarityMatch, VectorDimension, VectorError,
};
