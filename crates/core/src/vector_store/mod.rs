//! Embedded vector store: an append-only metadata ledger kept row-for-row parallel with
//! a nearest-neighbour backend, persisted as a JSON metadata file plus an optional
//! native index file.
//!
//! The store is single-writer. Mutating calls take `&mut self`; callers that share a
//! store across tasks wrap it in a lock (see [`crate::ChatService`]).

pub mod backend;
pub mod brute;
pub mod distance;
pub mod flat;
pub mod ledger;

pub use backend::{select_backend, BackendCapabilities, BackendKind, BackendSelection, IndexBackend};
pub use brute::BruteForceIndex;
pub use flat::FlatIpIndex;
pub use ledger::MetadataLedger;

use crate::models::{
    ChunkRecord, DocumentSummary, ExtraMetadata, SearchHit, RESERVED_METADATA_KEYS,
};
use crate::traits::VectorBackend;
use crate::StoreError;
use distance::{normalized, safe_norm};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const DEFAULT_INDEX_FILE: &str = "vector_index.bin";
pub const DEFAULT_METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl StoreConfig {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            index_path: dir.join(DEFAULT_INDEX_FILE),
            metadata_path: dir.join(DEFAULT_METADATA_FILE),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

#[derive(Debug)]
pub struct VectorStore {
    config: StoreConfig,
    ledger: MetadataLedger,
    backend: Option<IndexBackend>,
    lazy_kind: BackendKind,
}

impl VectorStore {
    /// Restores whatever is on disk. Unreadable artifacts are logged and set aside; the
    /// store then starts empty on brute force rather than failing.
    pub fn open(config: StoreConfig, capabilities: BackendCapabilities) -> Self {
        let (ledger, capabilities) = match MetadataLedger::load(&config.metadata_path) {
            Ok(ledger) => (ledger, capabilities),
            Err(load_error) => {
                error!(
                    path = %config.metadata_path.display(),
                    error = %load_error,
                    "metadata file unreadable; starting with an empty ledger"
                );
                quarantine(&config.metadata_path);
                (
                    MetadataLedger::new(&config.metadata_path),
                    BackendCapabilities::brute_force_only(),
                )
            }
        };

        let selection = select_backend(capabilities, &config.index_path, ledger.len());

        info!(
            records = ledger.len(),
            documents = ledger.group_by_document().len(),
            restored = ?selection.restored.as_ref().map(IndexBackend::kind),
            lazy_backend = ?selection.lazy_kind,
            "vector store opened"
        );

        Self {
            config,
            ledger,
            backend: selection.restored,
            lazy_kind: selection.lazy_kind,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn ledger(&self) -> &MetadataLedger {
        &self.ledger
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Fixed embedding width, once a backend exists.
    pub fn dimensions(&self) -> Option<usize> {
        self.backend.as_ref().map(VectorBackend::dimensions)
    }

    /// Variant currently answering searches, `None` until the first add or rebuild.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(IndexBackend::kind)
    }

    /// True when ledger records exist that the backend has no vectors for, e.g. after a
    /// restart on brute force. Fixed by [`VectorStore::rebuild_index`].
    pub fn needs_reindex(&self) -> bool {
        let indexed = self.backend.as_ref().map_or(0, VectorBackend::len);
        !self.ledger.is_empty() && indexed != self.ledger.len()
    }

    /// Texts of every ledger record in position order, for re-embedding.
    pub fn ledger_texts(&self) -> Vec<String> {
        self.ledger
            .records()
            .iter()
            .map(|record| record.text.clone())
            .collect()
    }

    /// Adds one document and returns its id.
    ///
    /// Nothing is mutated unless every row is valid. The metadata file is always
    /// rewritten and its failure is returned; the index file is written best-effort.
    pub fn add_document(
        &mut self,
        chunks: &[String],
        embeddings: &[Vec<f32>],
        metadata: ExtraMetadata,
    ) -> Result<String, StoreError> {
        if chunks.is_empty() || embeddings.is_empty() {
            return Err(StoreError::InvalidInput(
                "embeddings and chunks required".to_string(),
            ));
        }
        if chunks.len() != embeddings.len() {
            return Err(StoreError::InvalidInput(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let width = uniform_width(embeddings)?;
        if let Some(expected) = self.dimensions() {
            if expected != width {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: width,
                });
            }
        }
        if self.needs_reindex() {
            return Err(StoreError::IndexOutOfSync {
                ledger: self.ledger.len(),
                indexed: self.backend.as_ref().map_or(0, VectorBackend::len),
            });
        }

        let metadata = strip_reserved_keys(metadata);
        let rows: Vec<Vec<f32>> = embeddings.iter().map(|row| normalized(row)).collect();

        let lazy_kind = self.lazy_kind;
        let backend = self
            .backend
            .get_or_insert_with(|| IndexBackend::create(lazy_kind, width));
        backend.add(&rows)?;

        let document_id = self.ledger.allocate_document_id();
        let records = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                ChunkRecord::new(&document_id, index as u64, chunk.as_str(), metadata.clone())
            })
            .collect();
        self.ledger.append(records);

        self.ledger.persist()?;
        self.persist_index();

        info!(
            document_id = %document_id,
            chunks = chunks.len(),
            total_records = self.ledger.len(),
            "document added"
        );
        Ok(document_id)
    }

    /// Ranked hits, best first. An empty store, an unbuilt backend or `top_k == 0`
    /// yield an empty list.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, StoreError> {
        let backend = match &self.backend {
            Some(backend) if !self.ledger.is_empty() && top_k > 0 => backend,
            _ => return Ok(Vec::new()),
        };
        if query.len() != backend.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: backend.dimensions(),
                actual: query.len(),
            });
        }

        if let Some(column) = query.iter().position(|value| !value.is_finite()) {
            return Err(StoreError::InvalidInput(format!(
                "query value at column {column} is not finite"
            )));
        }

        let norm = safe_norm(query);
        let unit_query: Vec<f32> = query.iter().map(|value| value / norm).collect();

        let mut hits: Vec<SearchHit> = backend
            .search(&unit_query, top_k.min(backend.len()))
            .into_iter()
            .filter_map(|neighbor| {
                self.ledger.get(neighbor.position).map(|record| SearchHit {
                    record: record.clone(),
                    similarity_score: neighbor.score,
                })
            })
            .collect();

        hits.sort_by(|left, right| right.similarity_score.total_cmp(&left.similarity_score));
        Ok(hits)
    }

    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.ledger.group_by_document()
    }

    /// Forgets everything and removes both files. Removal failures are only logged.
    pub fn clear_all(&mut self) {
        self.ledger.clear();
        self.backend = None;
        remove_if_exists(&self.config.index_path);
        remove_if_exists(&self.config.metadata_path);
        info!("vector store cleared");
    }

    /// Replaces the backend with one built from `embeddings`, which must hold one row per
    /// ledger record in ledger order.
    pub fn rebuild_index(&mut self, embeddings: &[Vec<f32>]) -> Result<(), StoreError> {
        if embeddings.len() != self.ledger.len() {
            return Err(StoreError::InvalidInput(format!(
                "{} embeddings for {} ledger records",
                embeddings.len(),
                self.ledger.len()
            )));
        }
        if embeddings.is_empty() {
            self.backend = None;
            return Ok(());
        }

        let width = uniform_width(embeddings)?;
        let rows: Vec<Vec<f32>> = embeddings.iter().map(|row| normalized(row)).collect();
        let mut backend = IndexBackend::create(self.lazy_kind, width);
        backend.add(&rows)?;
        self.backend = Some(backend);
        self.persist_index();

        info!(
            vectors = rows.len(),
            dimensions = width,
            backend = ?self.lazy_kind,
            "vector index rebuilt from ledger"
        );
        Ok(())
    }

    fn persist_index(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        match backend.persist(&self.config.index_path) {
            Ok(true) => debug!(path = %self.config.index_path.display(), "index persisted"),
            Ok(false) => {}
            Err(persist_error) => warn!(
                path = %self.config.index_path.display(),
                error = %persist_error,
                "index persist failed; continuing in memory"
            ),
        }
    }
}

/// Checks every row has the same non-zero width and returns it.
fn uniform_width(embeddings: &[Vec<f32>]) -> Result<usize, StoreError> {
    let width = embeddings.first().map_or(0, Vec::len);
    if width == 0 {
        return Err(StoreError::InvalidInput(
            "embeddings must have at least one column".to_string(),
        ));
    }
    if let Some((row, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != width)
    {
        return Err(StoreError::InvalidInput(format!(
            "embedding row {row} has {} columns, expected {width}",
            bad.len()
        )));
    }
    reject_non_finite(embeddings)?;
    Ok(width)
}

/// NaN or infinite values would rank above every real score.
fn reject_non_finite(vectors: &[Vec<f32>]) -> Result<(), StoreError> {
    for (row, vector) in vectors.iter().enumerate() {
        if let Some(column) = vector.iter().position(|value| !value.is_finite()) {
            return Err(StoreError::InvalidInput(format!(
                "embedding row {row} has a non-finite value at column {column}"
            )));
        }
    }
    Ok(())
}

fn strip_reserved_keys(mut metadata: ExtraMetadata) -> ExtraMetadata {
    for key in RESERVED_METADATA_KEYS {
        if metadata.remove(key).is_some() {
            warn!(key, "dropping caller metadata that would shadow a record field");
        }
    }
    metadata
}

/// Rejects the batch when any row differs from `dimensions` or holds a non-finite value.
pub(crate) fn validate_rows(dimensions: usize, vectors: &[Vec<f32>]) -> Result<(), StoreError> {
    if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
        return Err(StoreError::DimensionMismatch {
            expected: dimensions,
            actual: bad.len(),
        });
    }
    reject_non_finite(vectors)
}

/// Writes `bytes` to a sibling `.tmp` file and renames it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling_with_suffix(path, ".tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(remove_error) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %remove_error, "could not remove store file");
    }
}

/// Moves an unreadable file aside so the next write does not destroy it.
fn quarantine(path: &Path) {
    let target = sibling_with_suffix(path, ".corrupt");
    if let Err(rename_error) = fs::rename(path, &target) {
        warn!(path = %path.display(), error = %rename_error, "could not set aside unreadable file");
    }
}
