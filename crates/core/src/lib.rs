pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod provider;
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod vector_store;

pub use chunking::{chunk_text, clean_text, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HashEmbedder, LocalEmbedder, LocalEmbedderKind,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, ProviderError, StoreError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    digest_file, discover_pdf_files, is_pdf_filename, prepare_pdf, IngestedPdf,
    IngestionReport, PreparedDocument, SkippedPdf,
};
pub use models::{
    ChatReply, ChunkRecord, DocumentSummary, ExtraMetadata, SearchHit, UploadReceipt,
};
pub use provider::{ChatHandler, ProviderConfig, RemoteProvider};
pub use service::{ChatService, StoreStatus, DEFAULT_TOP_K};
pub use traits::{EmbeddingProvider, ResponseGenerator, VectorBackend};
pub use vector_store::{BackendCapabilities, BackendKind, StoreConfig, VectorStore};
