// file: src/database/mod.rs
// description: index persistence module exports
// reference: internal module structure

pub mod client;
pub mod memory;
pub mod records;
pub mod schema;

pub use client::LanceDbClient;
pub use memory::MemoryRecordStore;
pub use records::LanceRecordStore;
pub use schema::SchemaManager;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::models::{EntityType, IndexedRecord, RecordKey};

/// Durable copy of the embedding index, one row per live record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces rows by record id.
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()>;

    /// Removes a row; absent rows are ignored.
    async fn delete(&self, key: &RecordKey) -> Result<()>;

    /// Rows of one entity type.
    async fn load(&self, entity_type: EntityType) -> Result<Vec<IndexedRecord>>;

    async fn reset(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    async fn ping(&self) -> Result<()>;

    fn describe(&self) -> String;
}

/// LanceDB when persistence is enabled, an in-process map otherwise.
pub async fn open_store(config: &IndexConfig) -> Result<Arc<dyn RecordStore>> {
    if config.persist {
        let store = LanceRecordStore::open(&config.uri, &config.table_name).await?;
        Ok(Arc::new(store))
    } else {
        Ok(Arc::new(MemoryRecordStore::new()))
    }
}
