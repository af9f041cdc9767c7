//! Interchangeable similarity backends.
//!
//! Every tier implements [`VectorIndex`] and produces similarities on the same
//! [0, 1] scale, so callers never branch on which tier is active. The tier is
//! chosen once by [`select_backend`], which runs a small self-test per tier
//! and walks down the ladder until one passes.

mod flat;
mod manual;
mod pairwise;

pub use flat::FlatIndex;
pub use manual::ManualIndex;
pub use pairwise::PairwiseIndex;

use crate::vector::{BackendPreference, BackendTier, Metric, SimilarityMatch, VectorError};
use rand::Rng;
use tracing::{debug, info, warn};

/// Raw score of one stored row against a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowScore {
    pub row: usize,
    /// Similarity clamped to [0, 1]
    pub similarity: f32,
    /// Backend-native value (inner product, cosine, or L2 distance)
    pub distance: f32,
}

/// Searchable index over one run's embeddings.
pub trait VectorIndex: Send + Sync {
    fn tier(&self) -> BackendTier;

    /// Replace the index contents with `rows`, all of `dimension` length.
    fn build(&mut self, rows: &[Vec<f32>], dimension: usize) -> Result<(), VectorError>;

    /// Score `query` against every stored row, in row order.
    fn score_all(&self, query: &[f32]) -> Vec<RowScore>;

    /// Similarity of two free vectors under this backend's scoring rule.
    fn pair_similarity(&self, a: &[f32], b: &[f32]) -> f32;

    /// Stored row, used when a stored row is itself the query.
    fn row(&self, index: usize) -> Option<&[f32]>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// `k` best rows at or above `threshold`, best first, ties by lower row.
    fn search(
        &self,
        query: &[f32],
        threshold: f32,
        k: usize,
        exclude: Option<usize>,
    ) -> Vec<SimilarityMatch> {
        rank(
            self.score_all(query),
            threshold,
            k,
            exclude,
            self.tier().confidence(),
        )
    }
}

/// Shared ranking used by every tier.
pub fn rank(
    scores: Vec<RowScore>,
    threshold: f32,
    k: usize,
    exclude: Option<usize>,
    confidence: f32,
) -> Vec<SimilarityMatch> {
    if k == 0 {
        return Vec::new();
    }

    let mut kept: Vec<RowScore> = scores
        .into_iter()
        .filter(|s| Some(s.row) != exclude && s.similarity >= threshold)
        .collect();

    kept.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.row.cmp(&b.row))
    });
    kept.truncate(k);

    kept.into_iter()
        .map(|s| SimilarityMatch {
            query_index: exclude,
            match_index: s.row,
            similarity_score: s.similarity,
            confidence: confidence.clamp(0.0, 1.0),
            distance: s.distance,
        })
        .collect()
}

/// Construct an empty index for `tier`.
pub fn create_backend(tier: BackendTier, metric: Metric) -> Result<Box<dyn VectorIndex>, VectorError> {
    Ok(match tier {
        BackendTier::Flat => Box::new(FlatIndex::new(metric)?),
        BackendTier::Pairwise => Box::new(PairwiseIndex::new()),
        BackendTier::Manual => Box::new(ManualIndex::new()),
    })
}

const PROBE_ROWS: usize = 8;
const PROBE_DIMENSION: usize = 16;

/// Build a tiny random index and check every row finds itself first.
pub fn probe(index: &mut dyn VectorIndex) -> Result<(), String> {
    let mut rng = rand::rng();
    let rows: Vec<Vec<f32>> = (0..PROBE_ROWS)
        .map(|_| {
            (0..PROBE_DIMENSION)
                .map(|_| rng.random_range(-1.0f32..1.0))
                .collect()
        })
        .collect();

    index
        .build(&rows, PROBE_DIMENSION)
        .map_err(|e| format!("build failed: {e}"))?;

    for (i, row) in rows.iter().enumerate() {
        let hits = index.search(row, 0.0, 1, None);
        match hits.first() {
            Some(hit) if hit.match_index == i && hit.similarity_score >= 0.999 => {}
            Some(hit) => {
                return Err(format!(
                    "row {i} ranked row {} first with score {:.4}",
                    hit.match_index, hit.similarity_score
                ));
            }
            None => return Err(format!("row {i} returned no results")),
        }
    }

    index.clear();
    Ok(())
}

/// Pick the best working tier at or below the configured preference.
pub fn select_backend(
    preference: BackendPreference,
    metric: Metric,
    use_gpu: bool,
) -> Result<Box<dyn VectorIndex>, VectorError> {
    if use_gpu {
        warn!("GPU similarity search is not available in this build; using CPU backends");
    }

    let mut last_failure = String::from("no tier attempted");
    for tier in preference.starting_tier().and_below() {
        let mut index = match create_backend(tier, metric) {
            Ok(index) => index,
            Err(e) => {
                debug!(%tier, error = %e, "similarity backend unavailable");
                last_failure = e.to_string();
                continue;
            }
        };

        match probe(index.as_mut()) {
            Ok(()) => {
                info!(
                    backend = %tier,
                    metric = %metric,
                    confidence = tier.confidence(),
                    "similarity backend selected"
                );
                return Ok(index);
            }
            Err(reason) => {
                warn!(%tier, %reason, "similarity backend failed self-test, trying next tier");
                last_failure = reason;
            }
        }
    }

    Err(VectorError::NoBackendAvailable {
        reason: last_failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[f32]) -> Vec<RowScore> {
        values
            .iter()
            .enumerate()
            .map(|(row, &similarity)| RowScore {
                row,
                similarity,
                distance: similarity,
            })
            .collect()
    }

    #[test]
    fn test_rank_sorts_and_breaks_ties_by_row() {
        let ranked = rank(scores(&[0.7, 0.9, 0.9, 0.2, 0.8]), 0.5, 10, None, 0.95);
        let order: Vec<usize> = ranked.iter().map(|m| m.match_index).collect();
        assert_eq!(order, vec![1, 2, 4, 0]);
    }

    #[test]
    fn test_rank_threshold_k_and_exclusion() {
        let ranked = rank(scores(&[1.0, 0.9, 0.8, 0.6]), 0.65, 2, Some(0), 0.85);
        let order: Vec<usize> = ranked.iter().map(|m| m.match_index).collect();
        assert_eq!(order, vec![1, 2]);
        assert!(ranked.iter().all(|m| m.query_index == Some(0)));
        assert!(ranked.iter().all(|m| m.confidence == 0.85));

        assert!(rank(scores(&[0.9]), 0.0, 0, None, 0.9).is_empty());
    }

    #[test]
    fn test_every_tier_passes_probe() {
        for tier in BackendTier::ORDERED {
            let mut index = create_backend(tier, Metric::InnerProduct).unwrap();
            assert_eq!(index.tier(), tier);
            probe(index.as_mut()).unwrap();
            assert!(index.is_empty());
        }

        let mut l2 = create_backend(BackendTier::Flat, Metric::L2).unwrap();
        probe(l2.as_mut()).unwrap();
    }

    #[test]
    fn test_select_backend_honors_preference() {
        let auto = select_backend(BackendPreference::Auto, Metric::InnerProduct, false).unwrap();
        assert_eq!(auto.tier(), BackendTier::Flat);

        let manual = select_backend(BackendPreference::Manual, Metric::InnerProduct, true).unwrap();
        assert_eq!(manual.tier(), BackendTier::Manual);
    }

    #[test]
    fn test_tiers_rank_identically() {
        let rows = vec![
            vec![1.0, 0.0, 0.0, 0.2],
            vec![0.9, 0.1, 0.0, 0.2],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.5, 0.5, 0.5, 0.5],
            vec![-1.0, 0.0, 0.0, 0.0],
        ];
        let query = vec![1.0, 0.05, 0.0, 0.2];

        let mut results = Vec::new();
        for tier in BackendTier::ORDERED {
            let mut index = create_backend(tier, Metric::InnerProduct).unwrap();
            index.build(&rows, 4).unwrap();
            let hits = index.search(&query, 0.0, 5, None);
            for hit in &hits {
                assert!((0.0..=1.0).contains(&hit.similarity_score));
            }
            results.push(hits);
        }

        for other in &results[1..] {
            assert_eq!(results[0].len(), other.len());
            for (a, b) in results[0].iter().zip(other) {
                assert_eq!(a.match_index, b.match_index);
                assert!((a.similarity_score - b.similarity_score).abs() < 1e-5);
            }
        }
    }
}
