//! Exact nearest-neighbor index over a contiguous row-major matrix.

use super::{RowScore, VectorIndex};
use crate::vector::similarity::{dot, l2_distance, l2_to_similarity, normalize_vector};
use crate::vector::{BackendTier, Metric, Score, VectorError};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::Arc;

/// Rows per rayon task; small matrices are scored on one thread.
const ROWS_PER_TASK: usize = 256;

/// Flat index scored in parallel on a dedicated rayon pool.
///
/// With [`Metric::InnerProduct`] rows and queries are stored unit-normalized,
/// so the inner product equals cosine similarity. With [`Metric::L2`] the
/// raw rows are kept and similarity is `1 / (1 + distance)`.
pub struct FlatIndex {
    metric: Metric,
    pool: Arc<ThreadPool>,
    data: Vec<f32>,
    dimension: usize,
    rows: usize,
}

impl std::fmt::Debug for FlatIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatIndex")
            .field("metric", &self.metric)
            .field("rows", &self.rows)
            .field("dimension", &self.dimension)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl FlatIndex {
    /// Fails when no worker pool can be started.
    pub fn new(metric: Metric) -> Result<Self, VectorError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("codedupe-flat-{i}"))
            .build()
            .map_err(|e| VectorError::BuildFailed {
                backend: BackendTier::Flat,
                reason: format!("cannot start worker pool: {e}"),
            })?;

        Ok(Self {
            metric,
            pool: Arc::new(pool),
            data: Vec::new(),
            dimension: 0,
            rows: 0,
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    fn prepare_query(&self, query: &[f32]) -> Vec<f32> {
        let mut query = query.to_vec();
        if self.metric == Metric::InnerProduct {
            normalize_vector(&mut query);
        }
        query
    }

    fn score(&self, query: &[f32], row: &[f32]) -> (f32, f32) {
        match self.metric {
            Metric::InnerProduct => {
                let ip = dot(query, row);
                (Score::clamped(ip).get(), ip)
            }
            Metric::L2 => {
                let distance = l2_distance(query, row);
                (Score::clamped(l2_to_similarity(distance)).get(), distance)
            }
        }
    }
}

impl VectorIndex for FlatIndex {
    fn tier(&self) -> BackendTier {
        BackendTier::Flat
    }

    fn build(&mut self, rows: &[Vec<f32>], dimension: usize) -> Result<(), VectorError> {
        let mut data = Vec::new();
        data.try_reserve_exact(rows.len() * dimension)
            .map_err(|e| VectorError::BuildFailed {
                backend: BackendTier::Flat,
                reason: format!("cannot allocate {} rows: {e}", rows.len()),
            })?;

        for row in rows {
            if row.len() != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            let start = data.len();
            data.extend_from_slice(row);
            if self.metric == Metric::InnerProduct {
                normalize_vector(&mut data[start..]);
            }
        }

        self.data = data;
        self.dimension = dimension;
        self.rows = rows.len();
        Ok(())
    }

    fn score_all(&self, query: &[f32]) -> Vec<RowScore> {
        if self.rows == 0 || query.len() != self.dimension {
            return Vec::new();
        }
        let query = self.prepare_query(query);
        let dimension = self.dimension;

        self.pool.install(|| {
            self.data
                .par_chunks(dimension)
                .with_min_len(ROWS_PER_TASK)
                .enumerate()
                .map(|(row, values)| {
                    let (similarity, distance) = self.score(&query, values);
                    RowScore {
                        row,
                        similarity,
                        distance,
                    }
                })
                .collect()
        })
    }

    fn pair_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        let a = self.prepare_query(a);
        let b = self.prepare_query(b);
        self.score(&a, &b).0
    }

    fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dimension;
        self.data.get(start..start + self.dimension)
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn clear(&mut self) {
        self.data = Vec::new();
        self.rows = 0;
        self.dimension = 0;
    }
}
