//! Pairwise cosine over a norm-cached matrix.

use super::{RowScore, VectorIndex};
use crate::vector::similarity::{cosine_similarity, dot, norm};
use crate::vector::{BackendTier, Score, VectorError};

/// Rows are kept as-is; their norms are computed once at build time so each
/// query costs one matrix-vector product plus a division per row.
#[derive(Debug, Default)]
pub struct PairwiseIndex {
    data: Vec<f32>,
    norms: Vec<f32>,
    dimension: usize,
}

impl PairwiseIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for PairwiseIndex {
    fn tier(&self) -> BackendTier {
        BackendTier::Pairwise
    }

    fn build(&mut self, rows: &[Vec<f32>], dimension: usize) -> Result<(), VectorError> {
        let mut data = Vec::with_capacity(rows.len() * dimension);
        let mut norms = Vec::with_capacity(rows.len());

        for row in rows {
            if row.len() != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
            norms.push(norm(row));
        }

        self.data = data;
        self.norms = norms;
        self.dimension = dimension;
        Ok(())
    }

    fn score_all(&self, query: &[f32]) -> Vec<RowScore> {
        if self.norms.is_empty() || query.len() != self.dimension {
            return Vec::new();
        }
        let query_norm = norm(query);

        self.data
            .chunks_exact(self.dimension)
            .zip(&self.norms)
            .enumerate()
            .map(|(row, (values, &row_norm))| {
                let cosine = if query_norm == 0.0 || row_norm == 0.0 {
                    0.0
                } else {
                    dot(query, values) / (query_norm * row_norm)
                };
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
        if index >= self.norms.len() {
            return None;
        }
        let start = index * self.dimension;
        self.data.get(start..start + self.dimension)
    }

    fn len(&self) -> usize {
        self.norms.len()
    }

    fn clear(&mut self) {
        self.data.clear();
        self.norms.clear();
        self.dimension = 0;
    }
}
