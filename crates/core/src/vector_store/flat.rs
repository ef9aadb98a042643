//! Exact inner-product index with a native on-disk format.
//!
//! File layout (all integers little-endian):
//! ```text
//! [Header: 20 bytes]
//!   - magic: u32 = "PCIX"
//!   - version: u8 = 1
//!   - metric: u8 (1 = inner product)
//!   - reserved: 2 bytes
//!   - dimensions: u32
//!   - vector_count: u64
//!
//! [Vector Data]
//!   - f32 x dimensions x vector_count, row-major
//!
//! [Footer: 4 bytes]
//!   - crc32c of header + vector data
//! ```

use super::distance::inner_product;
use super::{validate_rows, write_atomically};
use crate::traits::{Neighbor, VectorBackend};
use crate::StoreError;
use bytes::{Buf, BufMut, BytesMut};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::Path;

/// Magic number for index files: "PCIX" in little-endian.
pub const INDEX_MAGIC: u32 = 0x5849_4350;

pub const INDEX_VERSION: u8 = 1;

pub const INDEX_HEADER_SIZE: usize = 20;

pub const INDEX_FOOTER_SIZE: usize = 4;

const METRIC_INNER_PRODUCT: u8 = 1;

/// Label reported for result slots that no stored row filled.
pub const EMPTY_LABEL: i64 = -1;

/// Flat (exhaustive) inner-product index over contiguous rows.
///
/// Scores are raw dot products; callers store unit-length rows to get cosine similarity.
/// Top-k selection keeps a bounded heap instead of sorting every score.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dimensions: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            data: Vec::new(),
        }
    }

    /// Search returning exactly `k` slots as parallel `(scores, labels)` arrays.
    /// Unfilled slots carry [`EMPTY_LABEL`] and must be skipped by the caller.
    pub fn search_raw(&self, query: &[f32], k: usize) -> (Vec<f32>, Vec<i64>) {
        let mut heap: BinaryHeap<MinScored> = BinaryHeap::with_capacity(k + 1);

        if k > 0 {
            for (position, row) in self.data.chunks_exact(self.dimensions.max(1)).enumerate() {
                let score = inner_product(row, query);
                if heap.len() < k {
                    heap.push(MinScored { score, position });
                } else if let Some(worst) = heap.peek() {
                    if score > worst.score {
                        heap.pop();
                        heap.push(MinScored { score, position });
                    }
                }
            }
        }

        let mut ranked = heap.into_vec();
        ranked.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.position.cmp(&right.position))
        });

        let mut scores = Vec::with_capacity(k);
        let mut labels = Vec::with_capacity(k);
        for hit in ranked {
            scores.push(hit.score);
            labels.push(hit.position as i64);
        }
        while labels.len() < k {
            scores.push(f32::NEG_INFINITY);
            labels.push(EMPTY_LABEL);
        }
        (scores, labels)
    }

    pub fn encode(&self) -> BytesMut {
        let count = self.len();
        let mut buf =
            BytesMut::with_capacity(INDEX_HEADER_SIZE + self.data.len() * 4 + INDEX_FOOTER_SIZE);
        buf.put_u32_le(INDEX_MAGIC);
        buf.put_u8(INDEX_VERSION);
        buf.put_u8(METRIC_INNER_PRODUCT);
        buf.put_bytes(0, 2); // reserved
        buf.put_u32_le(self.dimensions as u32);
        buf.put_u64_le(count as u64);
        for value in &self.data {
            buf.put_f32_le(*value);
        }
        let crc = crc32c::crc32c(&buf);
        buf.put_u32_le(crc);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() < INDEX_HEADER_SIZE + INDEX_FOOTER_SIZE {
            return Err(StoreError::IndexFormat(format!(
                "index file truncated: {} bytes",
                bytes.len()
            )));
        }

        let (body, mut footer) = bytes.split_at(bytes.len() - INDEX_FOOTER_SIZE);
        let expected_crc = footer.get_u32_le();
        let actual_crc = crc32c::crc32c(body);
        if expected_crc != actual_crc {
            return Err(StoreError::IndexFormat(format!(
                "checksum mismatch: stored {expected_crc:#010x}, computed {actual_crc:#010x}"
            )));
        }

        let mut buf = body;
        let magic = buf.get_u32_le();
        if magic != INDEX_MAGIC {
            return Err(StoreError::IndexFormat(format!("invalid magic: {magic:#x}")));
        }
        let version = buf.get_u8();
        if version != INDEX_VERSION {
            return Err(StoreError::IndexFormat(format!(
                "unsupported version: {version}"
            )));
        }
        let metric = buf.get_u8();
        if metric != METRIC_INNER_PRODUCT {
            return Err(StoreError::IndexFormat(format!("unsupported metric: {metric}")));
        }
        buf.advance(2); // reserved
        let dimensions = buf.get_u32_le() as usize;
        let count = buf.get_u64_le() as usize;

        if dimensions == 0 {
            return Err(StoreError::IndexFormat("zero dimensions".to_string()));
        }
        let expected_values = count.checked_mul(dimensions).ok_or_else(|| {
            StoreError::IndexFormat(format!("{count} x {dimensions} overflows"))
        })?;
        if buf.remaining() != expected_values * 4 {
            return Err(StoreError::IndexFormat(format!(
                "expected {} bytes of vector data, found {}",
                expected_values * 4,
                buf.remaining()
            )));
        }

        let mut data = Vec::with_capacity(expected_values);
        while buf.has_remaining() {
            data.push(buf.get_f32_le());
        }

        Ok(Self { dimensions, data })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_atomically(path, &self.encode())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}

impl VectorBackend for FlatIpIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), StoreError> {
        validate_rows(self.dimensions, vectors)?;
        self.data.reserve(vectors.len() * self.dimensions);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let (scores, labels) = self.search_raw(query, k.min(self.len()));
        scores
            .into_iter()
            .zip(labels)
            .filter(|(_, label)| *label != EMPTY_LABEL)
            .map(|(score, label)| Neighbor {
                position: label as usize,
                score,
            })
            .collect()
    }
}

/// Heap entry ordered so the lowest score sits at the top of a max-heap.
#[derive(Debug, Clone, Copy)]
struct MinScored {
    score: f32,
    position: usize,
}

impl PartialEq for MinScored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MinScored {}

impl Ord for MinScored {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.position.cmp(&other.position))
    }
}

impl PartialOrd for MinScored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> FlatIpIndex {
        let mut index = FlatIpIndex::new(2);
        index
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]])
            .expect("rows share a width");
        index
    }

    #[test]
    fn raw_search_pads_missing_slots_with_empty_label() {
        let index = sample();
        let (scores, labels) = index.search_raw(&[1.0, 0.0], 5);
        assert_eq!(labels, vec![0, 2, 1, EMPTY_LABEL, EMPTY_LABEL]);
        assert_eq!(scores.len(), 5);
        assert!((scores[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn search_keeps_only_the_best_k() {
        let index = sample();
        let hits = index.search(&[0.0, 1.0], 2);
        let positions: Vec<usize> = hits.iter().map(|hit| hit.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn saved_index_loads_back_identically() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vector_index.bin");
        let index = sample();
        index.save(&path)?;

        let loaded = FlatIpIndex::load(&path)?;
        assert_eq!(loaded.dimensions(), 2);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.search(&[0.6, 0.8], 3), index.search(&[0.6, 0.8], 3));
        assert!(!dir.path().join("vector_index.bin.tmp").exists());
        Ok(())
    }

    #[test]
    fn corrupted_bytes_fail_the_checksum() {
        let mut bytes = sample().encode().to_vec();
        bytes[INDEX_HEADER_SIZE] ^= 0xff;
        assert!(matches!(
            FlatIpIndex::decode(&bytes),
            Err(StoreError::IndexFormat(_))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        assert!(matches!(
            FlatIpIndex::decode(b"PCIX"),
            Err(StoreError::IndexFormat(_))
        ));
    }
}
