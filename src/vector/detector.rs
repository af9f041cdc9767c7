//! Similarity detector: one index per run over the current symbol set.
//!
//! The detector owns whichever [`VectorIndex`] tier survived probing and adds
//! the run-level rules on top: optional normalization, count and dimension
//! validation, self-match exclusion, batch processing and symmetric pair
//! de-duplication.

use crate::config::SimilarityConfig;
use crate::symbol::Symbol;
use crate::vector::index::{VectorIndex, select_backend};
use crate::vector::similarity::normalize_vector;
use crate::vector::{BackendTier, Metric, SimilarityMatch, VectorDimension, VectorError};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct DetectorStats {
    index_builds: AtomicU64,
    searches: AtomicU64,
    matches: AtomicU64,
}

/// Diagnostic snapshot of the detector.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorInfo {
    pub method: BackendTier,
    pub metric: Metric,
    pub confidence: f32,
    pub index_built: bool,
    pub index_size: usize,
    pub dimension: Option<usize>,
    pub normalize_vectors: bool,
    pub include_self_matches: bool,
    pub batch_size: usize,
    pub max_results: usize,
    pub index_builds: u64,
    pub searches_performed: u64,
    pub matches_found: u64,
}

pub struct SimilarityDetector {
    config: SimilarityConfig,
    index: Box<dyn VectorIndex>,
    dimension: Option<VectorDimension>,
    built: bool,
    stats: DetectorStats,
}

impl std::fmt::Debug for SimilarityDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityDetector")
            .field("tier", &self.index.tier())
            .field("index_size", &self.index.len())
            .field("built", &self.built)
            .finish()
    }
}

impl SimilarityDetector {
    /// Probe backend tiers and keep the best one that works.
    pub fn new(config: SimilarityConfig) -> Result<Self, VectorError> {
        let index = select_backend(config.backend, config.metric, config.use_gpu)?;
        Ok(Self::with_index(config, index))
    }

    /// Use an explicit, already constructed backend.
    pub fn with_index(config: SimilarityConfig, index: Box<dyn VectorIndex>) -> Self {
        Self {
            config,
            index,
            dimension: None,
            built: false,
            stats: DetectorStats::default(),
        }
    }

    #[must_use]
    pub fn tier(&self) -> BackendTier {
        self.index.tier()
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Build the index over `embeddings`, one row per symbol.
    ///
    /// Returns `Ok(false)` for an empty input. Any failure with non-empty
    /// input is an error and leaves the detector unbuilt.
    pub fn build_index(
        &mut self,
        embeddings: &[Vec<f32>],
        symbols: &[Symbol],
    ) -> Result<bool, VectorError> {
        self.clear_index();

        if embeddings.len() != symbols.len() {
            return Err(VectorError::CountMismatch {
                embeddings: embeddings.len(),
                symbols: symbols.len(),
            });
        }
        let Some(first) = embeddings.first() else {
            debug!("no embeddings supplied, similarity index left empty");
            return Ok(false);
        };

        let dimension = VectorDimension::new(first.len())?;
        for embedding in embeddings {
            dimension.validate_vector(embedding)?;
        }

        let rows = if self.config.normalize_vectors {
            embeddings
                .iter()
                .map(|e| {
                    let mut row = e.clone();
                    normalize_vector(&mut row);
                    row
                })
                .collect()
        } else {
            embeddings.to_vec()
        };

        let tier = self.index.tier();
        self.index
            .build(&rows, dimension.get())
            .map_err(|e| match e {
                VectorError::BuildFailed { .. } | VectorError::DimensionMismatch { .. } => e,
                other => VectorError::BuildFailed {
                    backend: tier,
                    reason: other.to_string(),
                },
            })?;

        self.dimension = Some(dimension);
        self.built = true;
        self.stats.index_builds.fetch_add(1, Ordering::Relaxed);
        info!(
            backend = %tier,
            rows = rows.len(),
            dimension = dimension.get(),
            "similarity index built"
        );
        Ok(true)
    }

    fn prepare_query(&self, query: &[f32]) -> Result<Option<Vec<f32>>, VectorError> {
        let Some(dimension) = self.dimension.filter(|_| self.built) else {
            return Ok(None);
        };
        dimension.validate_vector(query)?;

        let mut query = query.to_vec();
        if self.config.normalize_vectors {
            normalize_vector(&mut query);
        }
        Ok(Some(query))
    }

    /// `k` nearest stored rows at or above `threshold` for an external query.
    ///
    /// An index that was never built yields no matches.
    pub fn find_similar(
        &self,
        query: &[f32],
        threshold: f32,
        k: usize,
    ) -> Result<Vec<SimilarityMatch>, VectorError> {
        let Some(query) = self.prepare_query(query)? else {
            return Ok(Vec::new());
        };
        let matches = self.index.search(&query, threshold, k, None);
        self.record_search(matches.len());
        Ok(matches)
    }

    /// Neighbors of stored row `row`, excluding itself unless configured.
    pub fn find_similar_to_row(
        &self,
        row: usize,
        threshold: f32,
        k: usize,
    ) -> Vec<SimilarityMatch> {
        let Some(query) = self.index.row(row).filter(|_| self.built) else {
            return Vec::new();
        };
        let mut matches = self.index.search(query, threshold, k, self.self_exclusion(row));
        for m in &mut matches {
            m.query_index = Some(row);
        }
        self.record_search(matches.len());
        matches
    }

    /// Search every embedding against the index in batches.
    ///
    /// Query `i` is taken to be stored row `i`, so row `i` is its self-match.
    /// Each unordered pair is reported once, under the query that found it
    /// first; queries with no remaining matches are omitted.
    pub fn batch_similarity_search(
        &self,
        embeddings: &[Vec<f32>],
        threshold: f32,
    ) -> Result<BTreeMap<usize, Vec<SimilarityMatch>>, VectorError> {
        let mut results = BTreeMap::new();
        if !self.built || embeddings.is_empty() {
            return Ok(results);
        }

        let mut reported: HashSet<(usize, usize)> = HashSet::new();
        let batch_size = self.config.batch_size.max(1);

        for (batch_number, batch) in embeddings.chunks(batch_size).enumerate() {
            let offset = batch_number * batch_size;
            for (position, embedding) in batch.iter().enumerate() {
                let query_index = offset + position;
                let Some(query) = self.prepare_query(embedding)? else {
                    continue;
                };

                let mut matches = self.index.search(
                    &query,
                    threshold,
                    self.config.max_results,
                    self.self_exclusion(query_index),
                );
                matches.retain(|m| {
                    let pair = (
                        query_index.min(m.match_index),
                        query_index.max(m.match_index),
                    );
                    reported.insert(pair)
                });
                for m in &mut matches {
                    m.query_index = Some(query_index);
                }

                self.record_search(matches.len());
                if !matches.is_empty() {
                    results.insert(query_index, matches);
                }
            }
            debug!(
                batch = batch_number,
                queries = batch.len(),
                "similarity batch processed"
            );
        }

        Ok(results)
    }

    /// Similarity of two free vectors under the active backend, in [0, 1].
    #[must_use]
    pub fn compute_pairwise_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        self.index.pair_similarity(a, b)
    }

    pub fn clear_index(&mut self) {
        self.index.clear();
        self.dimension = None;
        self.built = false;
    }

    #[must_use]
    pub fn detector_info(&self) -> DetectorInfo {
        let tier = self.index.tier();
        DetectorInfo {
            method: tier,
            metric: self.config.metric,
            confidence: tier.confidence(),
            index_built: self.built,
            index_size: self.index.len(),
            dimension: self.dimension.map(|d| d.get()),
            normalize_vectors: self.config.normalize_vectors,
            include_self_matches: self.config.include_self_matches,
            batch_size: self.config.batch_size,
            max_results: self.config.max_results,
            index_builds: self.stats.index_builds.load(Ordering::Relaxed),
            searches_performed: self.stats.searches.load(Ordering::Relaxed),
            matches_found: self.stats.matches.load(Ordering::Relaxed),
        }
    }

    fn self_exclusion(&self, row: usize) -> Option<usize> {
        if self.config.include_self_matches {
            None
        } else {
            Some(row)
        }
    }

    fn record_search(&self, matches: usize) {
        self.stats.searches.fetch_add(1, Ordering::Relaxed);
        self.stats
            .matches
            .fetch_add(matches as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;
    use crate::vector::BackendPreference;
    use crate::vector::index::create_backend;

    fn symbols(n: usize) -> Vec<Symbol> {
        (0..n)
            .map(|i| {
                Symbol::new(
                    format!("f{i}"),
                    SymbolKind::Function,
                    "a.py",
                    i as u32 + 1,
                    "def f(): pass",
                )
            })
            .collect()
    }

    fn embeddings() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.98, 0.2, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 0.0, 0.0],
        ]
    }

    fn detector(tier: BackendTier) -> SimilarityDetector {
        let config = SimilarityConfig::default();
        let index = create_backend(tier, config.metric).unwrap();
        SimilarityDetector::with_index(config, index)
    }

    #[test]
    fn test_unbuilt_index_returns_empty() {
        let detector = detector(BackendTier::Flat);
        assert!(detector.find_similar(&[1.0, 0.0], 0.0, 5).unwrap().is_empty());
        assert!(detector.find_similar_to_row(0, 0.0, 5).is_empty());
        assert!(
            detector
                .batch_similarity_search(&embeddings(), 0.0)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_build_rejects_count_and_dimension_mismatch() {
        let mut detector = detector(BackendTier::Pairwise);
        let err = detector.build_index(&embeddings(), &symbols(2)).unwrap_err();
        assert!(matches!(err, VectorError::CountMismatch { .. }));

        let ragged = vec![vec![1.0, 0.0], vec![1.0]];
        let err = detector.build_index(&ragged, &symbols(2)).unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { .. }));
        assert!(!detector.is_built());

        assert!(!detector.build_index(&[], &[]).unwrap());
    }

    #[test]
    fn test_find_similar_excludes_nothing_for_external_query() {
        let mut detector = detector(BackendTier::Flat);
        assert!(detector.build_index(&embeddings(), &symbols(5)).unwrap());

        let hits = detector.find_similar(&[1.0, 0.0, 0.0], 0.9, 10).unwrap();
        let order: Vec<usize> = hits.iter().map(|m| m.match_index).collect();
        // Rows 0 and 4 tie at 1.0, lower index first
        assert_eq!(order, vec![0, 4, 1]);

        let err = detector.find_similar(&[1.0, 0.0], 0.0, 1).unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_row_search_excludes_self_by_default() {
        let mut detector = detector(BackendTier::Manual);
        detector.build_index(&embeddings(), &symbols(5)).unwrap();

        let hits = detector.find_similar_to_row(0, 0.9, 10);
        assert!(hits.iter().all(|m| m.match_index != 0));
        assert_eq!(hits[0].match_index, 4);
        assert_eq!(hits[0].query_index, Some(0));
    }

    #[test]
    fn test_self_matches_when_enabled() {
        let config = SimilarityConfig {
            include_self_matches: true,
            ..SimilarityConfig::default()
        };
        let index = create_backend(BackendTier::Flat, config.metric).unwrap();
        let mut detector = SimilarityDetector::with_index(config, index);
        detector.build_index(&embeddings(), &symbols(5)).unwrap();

        let hits = detector.find_similar_to_row(2, 0.99, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_index, 2);
    }

    #[test]
    fn test_batch_search_reports_each_pair_once() {
        for tier in BackendTier::ORDERED {
            let mut detector = detector(tier);
            let embeddings = embeddings();
            detector.build_index(&embeddings, &symbols(5)).unwrap();

            let results = detector.batch_similarity_search(&embeddings, 0.9).unwrap();

            let mut seen = HashSet::new();
            for (query, matches) in &results {
                for m in matches {
                    assert_ne!(*query, m.match_index);
                    let pair = ((*query).min(m.match_index), (*query).max(m.match_index));
                    assert!(seen.insert(pair), "pair {pair:?} reported twice on {tier}");
                }
            }
            // 0-1, 0-4, 1-4
            assert_eq!(seen.len(), 3, "tier {tier}");
        }
    }

    #[test]
    fn test_batches_smaller_than_input() {
        let config = SimilarityConfig {
            batch_size: 2,
            ..SimilarityConfig::default()
        };
        let index = create_backend(BackendTier::Pairwise, config.metric).unwrap();
        let mut detector = SimilarityDetector::with_index(config, index);
        let embeddings = embeddings();
        detector.build_index(&embeddings, &symbols(5)).unwrap();

        let results = detector.batch_similarity_search(&embeddings, 0.9).unwrap();
        let total: usize = results.values().map(Vec::len).sum();
        assert_eq!(total, 3);
        assert!(results.keys().all(|k| *k < 5));
    }

    #[test]
    fn test_pairwise_similarity_is_commutative() {
        let detector = SimilarityDetector::new(SimilarityConfig {
            backend: BackendPreference::Auto,
            ..SimilarityConfig::default()
        })
        .unwrap();
        let a = [0.3, 0.4, 0.5];
        let b = [0.9, -0.1, 0.2];
        assert_eq!(
            detector.compute_pairwise_similarity(&a, &b),
            detector.compute_pairwise_similarity(&b, &a)
        );
        assert_eq!(detector.compute_pairwise_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_clear_and_info() {
        let mut detector = detector(BackendTier::Flat);
        detector.build_index(&embeddings(), &symbols(5)).unwrap();
        let info = detector.detector_info();
        assert!(info.index_built);
        assert_eq!(info.index_size, 5);
        assert_eq!(info.dimension, Some(3));
        assert_eq!(info.confidence, 0.95);

        detector.clear_index();
        let info = detector.detector_info();
        assert!(!info.index_built);
        assert_eq!(info.index_size, 0);
    }
}
