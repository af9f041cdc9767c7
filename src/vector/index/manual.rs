//! Baseline tier: one cosine computation per stored row, no precomputation.

use super::{RowScore, VectorIndex};
use crate::vector::similarity::cosine_similarity;
use crate::vector::{BackendTier, Score, VectorError};

#[derive(Debug, Default)]
pub struct ManualIndex {
    rows: Vec<Vec<f32>>,
}

impl ManualIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for ManualIndex {
    fn tier(&self) -> BackendTier {
        BackendTier::Manual
    }

    fn build(&mut self, rows: &[Vec<f32>], dimension: usize) -> Result<(), VectorError> {
        if let Some(bad) = rows.iter().find(|row| row.len() != dimension) {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        self.rows = rows.to_vec();
        Ok(())
    }

    fn score_all(&self, query: &[f32]) -> Vec<RowScore> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.len() == query.len())
            .map(|(row, values)| {
                let cosine = cosine_similarity(query, values);
                RowScore {
                    row,
                    similarity: Score::clamped(cosine).get(),
                    distance: 1.0 - cosine,
                }
            })
            .collect()
    }

    fn pair_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        Score::clamped(cosine_similarity(a, b)).get()
    }

    fn row(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_search_excludes_self() {
        let mut index = ManualIndex::new();
        index
            .build(&[vec![1.0, 0.0], vec![1.0, 0.1], vec![0.0, 1.0]], 2)
            .unwrap();

        let query = index.row(0).unwrap().to_vec();
        let hits = index.search(&query, 0.5, 10, Some(0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_index, 1);
        assert_eq!(hits[0].confidence, 0.75);
    }
}
