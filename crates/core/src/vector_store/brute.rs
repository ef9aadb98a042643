use super::distance::{inner_product, safe_norm};
use super::validate_rows;
use crate::traits::{Neighbor, VectorBackend};
use crate::StoreError;

/// Dense row-major matrix scanned in full on every query.
///
/// Rows are normalized at query time, so stored vectors need not be unit length.
/// Holds no on-disk state: after a restart it is rebuilt from the ledger.
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    dimensions: usize,
    rows: Vec<f32>,
}

impl BruteForceIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rows: Vec::new(),
        }
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimensions;
        &self.rows[start..start + self.dimensions]
    }
}

impl VectorBackend for BruteForceIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.rows.len() / self.dimensions
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), StoreError> {
        validate_rows(self.dimensions, vectors)?;
        self.rows.reserve(vectors.len() * self.dimensions);
        for vector in vectors {
            self.rows.extend_from_slice(vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let total = self.len();
        if k == 0 || total == 0 {
            return Vec::new();
        }

        let mut scored: Vec<Neighbor> = (0..total)
            .map(|position| {
                let row = self.row(position);
                Neighbor {
                    position,
                    score: inner_product(row, query) / safe_norm(row),
                }
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.position.cmp(&right.position))
        });
        scored.truncate(k.min(total));
        scored
    }
}
