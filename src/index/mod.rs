// file: src/index/mod.rs
// description: embedding index module exports and search seam
// reference: internal module structure

pub mod distance;
pub mod embedding_index;
pub mod hnsw;
pub mod namespace;

pub use embedding_index::{BatchOutcome, EmbeddingIndex, RefreshReport};
pub use hnsw::{HnswGraph, HnswParams};
pub use namespace::NamespaceSnapshot;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{Candidate, EntityType, NormalizedRecord, RecordKey};

/// What an upsert did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted { version: u64 },
    Reembedded { version: u64 },
    MetadataOnly,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceStats {
    pub live: usize,
    pub tombstones: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub namespaces: BTreeMap<EntityType, NamespaceStats>,
    pub total_live: usize,
    pub dimension: usize,
}

impl IndexStats {
    pub fn new(namespaces: BTreeMap<EntityType, NamespaceStats>, dimension: usize) -> Self {
        let total_live = namespaces.values().map(|ns| ns.live).sum();
        Self {
            namespaces,
            total_live,
            dimension,
        }
    }

    pub fn live(&self, entity_type: EntityType) -> usize {
        self.namespaces
            .get(&entity_type)
            .map(|ns| ns.live)
            .unwrap_or(0)
    }
}

/// Operations the query engine needs from an index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` candidates of one entity type by descending raw similarity.
    async fn search(&self, entity_type: EntityType, vector: &[f32], k: usize)
        -> Result<Vec<Candidate>>;

    async fn upsert(&self, record: NormalizedRecord) -> Result<UpsertOutcome>;

    /// Returns whether a live record was removed.
    async fn delete(&self, key: &RecordKey) -> Result<bool>;

    fn stats(&self) -> Result<IndexStats>;

    /// Donor cities and hospital locations currently indexed.
    fn known_places(&self) -> Vec<String>;
}
