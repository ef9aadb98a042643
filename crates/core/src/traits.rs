use crate::{ProviderError, SearchHit, StoreError};
use async_trait::async_trait;

/// A ranked match: `position` indexes both the backend rows and the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// Row-oriented nearest-neighbour index whose row order mirrors the ledger.
pub trait VectorBackend {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends rows in order. Rejects the whole batch if any row has the wrong width.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), StoreError>;

    /// Up to `k` neighbours, best first. `query` must already be unit length.
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor>;
}

#[async_trait]
pub trait EmbeddingProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

#[async_trait]
pub trait ResponseGenerator {
    async fn generate(&self, query: &str, context: &[SearchHit]) -> Result<String, ProviderError>;
}
