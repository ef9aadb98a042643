use super::brute::BruteForceIndex;
use super::flat::FlatIpIndex;
use crate::traits::{Neighbor, VectorBackend};
use crate::StoreError;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Accelerated,
    BruteForce,
}

/// What the running build can offer. Resolved once and handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub accelerated: bool,
}

impl BackendCapabilities {
    pub fn detect() -> Self {
        Self {
            accelerated: cfg!(feature = "accelerated-index"),
        }
    }

    pub fn brute_force_only() -> Self {
        Self { accelerated: false }
    }
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[derive(Debug, Clone)]
pub enum IndexBackend {
    Accelerated(FlatIpIndex),
    BruteForce(BruteForceIndex),
}

impl IndexBackend {
    pub fn create(kind: BackendKind, dimensions: usize) -> Self {
        match kind {
            BackendKind::Accelerated => Self::Accelerated(FlatIpIndex::new(dimensions)),
            BackendKind::BruteForce => Self::BruteForce(BruteForceIndex::new(dimensions)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Accelerated(_) => BackendKind::Accelerated,
            Self::BruteForce(_) => BackendKind::BruteForce,
        }
    }

    /// Writes the index file when the variant has one. Returns whether anything was written.
    pub fn persist(&self, path: &Path) -> Result<bool, StoreError> {
        match self {
            Self::Accelerated(index) => index.save(path).map(|()| true),
            Self::BruteForce(_) => Ok(false),
        }
    }

    fn as_backend(&self) -> &dyn VectorBackend {
        match self {
            Self::Accelerated(index) => index,
            Self::BruteForce(index) => index,
        }
    }

    fn as_backend_mut(&mut self) -> &mut dyn VectorBackend {
        match self {
            Self::Accelerated(index) => index,
            Self::BruteForce(index) => index,
        }
    }
}

impl VectorBackend for IndexBackend {
    fn dimensions(&self) -> usize {
        self.as_backend().dimensions()
    }

    fn len(&self) -> usize {
        self.as_backend().len()
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), StoreError> {
        self.as_backend_mut().add(vectors)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        self.as_backend().search(query, k)
    }
}

/// Result of choosing a backend at construction time.
#[derive(Debug)]
pub struct BackendSelection {
    /// Backend restored from disk, if any.
    pub restored: Option<IndexBackend>,
    /// Variant to create lazily on the first add or rebuild.
    pub lazy_kind: BackendKind,
}

/// Picks the backend for a store whose ledger holds `ledger_len` records.
///
/// Precedence: a persisted index is restored when acceleration is available and the file
/// exists. Without a file the accelerated variant is created lazily if available,
/// otherwise brute force. A restore failure pins the store to brute force.
pub fn select_backend(
    capabilities: BackendCapabilities,
    index_path: &Path,
    ledger_len: usize,
) -> BackendSelection {
    if !capabilities.accelerated {
        return BackendSelection {
            restored: None,
            lazy_kind: BackendKind::BruteForce,
        };
    }

    if !index_path.exists() {
        return BackendSelection {
            restored: None,
            lazy_kind: BackendKind::Accelerated,
        };
    }

    let failure = match FlatIpIndex::load(index_path) {
        Ok(index) if index.len() == ledger_len => {
            info!(
                path = %index_path.display(),
                vectors = index.len(),
                dimensions = index.dimensions(),
                "restored accelerated index"
            );
            return BackendSelection {
                restored: Some(IndexBackend::Accelerated(index)),
                lazy_kind: BackendKind::Accelerated,
            };
        }
        Ok(index) => format!(
            "index holds {} vectors but the ledger has {} records",
            index.len(),
            ledger_len
        ),
        Err(error) => error.to_string(),
    };

    warn!(
        path = %index_path.display(),
        error = %failure,
        "accelerated index could not be restored; using brute force for this process"
    );
    BackendSelection {
        restored: None,
        lazy_kind: BackendKind::BruteForce,
    }
}
