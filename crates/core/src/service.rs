use crate::chunking::ChunkingConfig;
use crate::extractor::LopdfExtractor;
use crate::ingest::{
    discover_pdf_files, display_name, prepare_pdf, IngestedPdf, IngestionReport, SkippedPdf,
};
use crate::models::{ChatReply, DocumentSummary, UploadReceipt};
use crate::provider::{ChatHandler, RemoteProvider};
use crate::traits::{EmbeddingProvider, ResponseGenerator};
use crate::vector_store::{BackendKind, VectorStore};
use crate::{IngestError, StoreError};
use serde::Serialize;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const DEFAULT_TOP_K: usize = 5;

/// Snapshot of the store for status reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreStatus {
    pub records: usize,
    pub documents: usize,
    pub backend: Option<BackendKind>,
    pub dimensions: Option<usize>,
    pub remote_provider: bool,
}

/// Shared entry point for the HTTP handlers and the CLI. Searches take a read lock;
/// uploads, clears and rebuilds take the write lock.
pub struct ChatService<R = RemoteProvider> {
    store: RwLock<VectorStore>,
    handler: ChatHandler<R>,
    chunking: ChunkingConfig,
}

impl<R> ChatService<R>
where
    R: EmbeddingProvider + ResponseGenerator + Send + Sync,
{
    pub fn new(store: VectorStore, handler: ChatHandler<R>, chunking: ChunkingConfig) -> Self {
        Self {
            store: RwLock::new(store),
            handler,
            chunking,
        }
    }

    /// Ingests the PDF at `path`, recorded under `filename`.
    pub async fn upload(&self, path: &Path, filename: &str) -> Result<UploadReceipt, IngestError> {
        let prepared = tokio::task::block_in_place(|| {
            prepare_pdf(&LopdfExtractor, path, filename, self.chunking)
        })?;
        let embeddings = self.handler.generate_embeddings(&prepared.chunks).await;

        let mut store = self.store.write().await;
        let document_id = tokio::task::block_in_place(|| {
            store.add_document(&prepared.chunks, &embeddings, prepared.metadata)
        })?;

        info!(
            document_id = %document_id,
            filename = %prepared.filename,
            chunks = prepared.chunks.len(),
            "document ingested"
        );

        Ok(UploadReceipt {
            document_id,
            chunks_count: prepared.chunks.len(),
        })
    }

    /// Uploads every PDF under `folder`. A file that fails is reported and skipped; only an
    /// empty folder is an error.
    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut report = IngestionReport::default();
        for path in files {
            let outcome = match display_name(&path) {
                Ok(filename) => self.upload(&path, &filename).await,
                Err(name_error) => Err(name_error),
            };

            match outcome {
                Ok(receipt) => report.ingested.push(IngestedPdf {
                    path,
                    document_id: receipt.document_id,
                    chunks_count: receipt.chunks_count,
                }),
                Err(ingest_error) => {
                    warn!(path = %path.display(), error = %ingest_error, "skipping pdf");
                    report.skipped_files.push(SkippedPdf {
                        path,
                        reason: ingest_error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Answers `message` from the `top_k` closest chunks.
    pub async fn chat(&self, message: &str, top_k: usize) -> Result<ChatReply, StoreError> {
        if message.trim().is_empty() {
            return Err(StoreError::InvalidInput("message is required".to_string()));
        }

        let query = self.handler.generate_query_embedding(message).await;
        let sources = self.store.read().await.search(&query, top_k)?;
        let response = self.handler.generate_response(message, &sources).await;

        Ok(ChatReply { response, sources })
    }

    pub async fn documents(&self) -> Vec<DocumentSummary> {
        self.store.read().await.list_documents()
    }

    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        tokio::task::block_in_place(|| store.clear_all());
    }

    /// Re-embeds the ledger when the backend does not cover it. Returns whether a rebuild
    /// happened.
    pub async fn reindex_if_needed(&self) -> Result<bool, StoreError> {
        let mut store = self.store.write().await;
        if !store.needs_reindex() {
            return Ok(false);
        }

        let texts = store.ledger_texts();
        info!(records = texts.len(), "re-embedding ledger to rebuild the vector index");
        let embeddings = self.handler.generate_embeddings(&texts).await;
        tokio::task::block_in_place(|| store.rebuild_index(&embeddings))?;
        Ok(true)
    }

    pub async fn status(&self) -> StoreStatus {
        let store = self.store.read().await;
        StoreStatus {
            records: store.len(),
            documents: store.list_documents().len(),
            backend: store.backend_kind(),
            dimensions: store.dimensions(),
            remote_provider: self.handler.is_remote(),
        }
    }
}
