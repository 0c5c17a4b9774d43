// file: src/models/record.rs
// description: normalized records and the index entries built from them
// reference: internal data structures

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::entity::{EntityType, RecordKey, SourceId};

/// Structured fields of a source entity, passed through to responses verbatim.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Output of the record normalizer: what gets embedded plus what gets returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub key: RecordKey,
    pub text: String,
    pub metadata: Metadata,
}

impl NormalizedRecord {
    pub fn entity_type(&self) -> EntityType {
        self.key.entity_type
    }

    pub fn source_id(&self) -> &SourceId {
        &self.key.source_id
    }

    pub fn text_hash(&self) -> String {
        compute_hash(&self.text)
    }
}

/// A live record inside the embedding index.
///
/// `embedding` is immutable for a given `text`; a changed text produces a new
/// entry with a bumped `version`.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub key: RecordKey,
    pub text: String,
    pub metadata: Arc<Metadata>,
    pub embedding: Arc<[f32]>,
    pub version: u64,
    pub updated_at: u64,
}

impl IndexedRecord {
    pub fn new(record: NormalizedRecord, embedding: Vec<f32>, version: u64) -> Self {
        Self {
            key: record.key,
            text: record.text,
            metadata: Arc::new(record.metadata),
            embedding: Arc::from(embedding),
            version,
            updated_at: unix_now(),
        }
    }

    pub fn record_id(&self) -> String {
        self.key.record_id()
    }
}

pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
