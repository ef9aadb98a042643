use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Caller-supplied metadata merged into every chunk record of a document.
pub type ExtraMetadata = BTreeMap<String, Value>;

/// Keys owned by [`ChunkRecord`] and [`SearchHit`]; caller metadata may not shadow them.
pub const RESERVED_METADATA_KEYS: [&str; 5] =
    ["id", "document_id", "chunk_index", "text", "similarity_score"];

pub const UNKNOWN_FILENAME: &str = "Unknown";

/// One ingested chunk. Serializes as a flat JSON object: the fixed fields followed by
/// every caller-supplied metadata key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: u64,
    pub text: String,
    #[serde(flatten)]
    pub extra: ExtraMetadata,
}

impl ChunkRecord {
    pub fn new(
        document_id: &str,
        chunk_index: u64,
        text: impl Into<String>,
        extra: ExtraMetadata,
    ) -> Self {
        Self {
            id: format!("{document_id}_{chunk_index}"),
            document_id: document_id.to_string(),
            chunk_index,
            text: text.into(),
            extra,
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.extra.get("filename").and_then(Value::as_str)
    }
}

/// Virtual grouping of ledger records sharing a `document_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub chunks_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: ChunkRecord,
    pub similarity_score: f32,
}

impl SearchHit {
    pub fn text(&self) -> &str {
        &self.record.text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub sources: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub document_id: String,
    pub chunks_count: usize,
}
