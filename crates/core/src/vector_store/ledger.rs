use super::write_atomically;
use crate::models::{ChunkRecord, DocumentSummary, UNKNOWN_FILENAME};
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const LEDGER_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct LedgerFileRef<'a> {
    version: u32,
    next_document_id: u64,
    records: &'a [ChunkRecord],
}

#[derive(Deserialize)]
struct LedgerFile {
    #[serde(default)]
    version: u32,
    next_document_id: u64,
    records: Vec<ChunkRecord>,
}

/// Either the current envelope or the older bare array of records.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Envelope(LedgerFile),
    Legacy(Vec<ChunkRecord>),
}

/// Ordered, append-only list of chunk records. Position `i` here is row `i` in the
/// vector backend.
#[derive(Debug, Clone)]
pub struct MetadataLedger {
    path: PathBuf,
    records: Vec<ChunkRecord>,
    next_document_id: u64,
}

impl MetadataLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
            next_document_id: 0,
        }
    }

    /// Reads the ledger at `path`, or returns an empty one when no file exists.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut ledger = Self::new(path);
        if !ledger.path.exists() {
            return Ok(ledger);
        }

        let bytes = fs::read(&ledger.path)?;
        match serde_json::from_slice::<StoredLedger>(&bytes)? {
            StoredLedger::Envelope(file) => {
                if file.version > LEDGER_FORMAT_VERSION {
                    return Err(StoreError::InvalidInput(format!(
                        "metadata file version {} is newer than supported {}",
                        file.version, LEDGER_FORMAT_VERSION
                    )));
                }
                // Never hand out an id that is already present, whatever the file says.
                let floor = derive_next_document_id(&file.records);
                ledger.next_document_id = file.next_document_id.max(floor);
                ledger.records = file.records;
            }
            StoredLedger::Legacy(records) => {
                ledger.next_document_id = derive_next_document_id(&records);
                ledger.records = records;
            }
        }

        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn get(&self, position: usize) -> Option<&ChunkRecord> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn next_document_id(&self) -> u64 {
        self.next_document_id
    }

    /// Post-increments the document counter and returns the id it held.
    pub fn allocate_document_id(&mut self) -> String {
        let id = self.next_document_id;
        self.next_document_id += 1;
        id.to_string()
    }

    pub fn append(&mut self, records: Vec<ChunkRecord>) {
        self.records.extend(records);
    }

    /// Rewrites the whole metadata file.
    pub fn persist(&self) -> Result<(), StoreError> {
        let file = LedgerFileRef {
            version: LEDGER_FORMAT_VERSION,
            next_document_id: self.next_document_id,
            records: &self.records,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomically(&self.path, &bytes)?;
        Ok(())
    }

    pub fn group_by_document(&self) -> Vec<DocumentSummary> {
        let mut order: Vec<DocumentSummary> = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for record in &self.records {
            match seen.get(record.document_id.as_str()) {
                Some(&slot) => order[slot].chunks_count += 1,
                None => {
                    seen.insert(record.document_id.as_str(), order.len());
                    order.push(DocumentSummary {
                        id: record.document_id.clone(),
                        filename: record
                            .filename()
                            .unwrap_or(UNKNOWN_FILENAME)
                            .to_string(),
                        chunks_count: 1,
                    });
                }
            }
        }

        order
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.next_document_id = 0;
    }
}

/// One past the largest numeric document id, falling back to the number of distinct
/// ids when none of them are numeric.
fn derive_next_document_id(records: &[ChunkRecord]) -> u64 {
    let numeric_max = records
        .iter()
        .filter_map(|record| record.document_id.parse::<u64>().ok())
        .max();

    match numeric_max {
        Some(max) => max + 1,
        None => records
            .iter()
            .map(|record| record.document_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u64,
    }
}
