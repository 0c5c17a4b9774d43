// file: src/database/memory.rs
// description: in-process record store used when persistence is disabled
// reference: internal data structures

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::database::RecordStore;
use crate::error::Result;
use crate::models::{EntityType, IndexedRecord, RecordKey};

/// Map-backed [`RecordStore`]. Shared between index instances it behaves like
/// a database seen by several processes.
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: RwLock<BTreeMap<RecordKey, IndexedRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        let mut rows = self.rows.write().await;
        for record in records {
            rows.insert(record.key.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        self.rows.write().await.remove(key);
        Ok(())
    }

    async fn load(&self, entity_type: EntityType) -> Result<Vec<IndexedRecord>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| row.key.entity_type == entity_type)
            .cloned()
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        self.rows.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().await.len())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
