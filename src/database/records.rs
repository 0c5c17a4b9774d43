// file: src/database/records.rs
// description: LanceDB write-through store for index records
// reference: https://docs.rs/lancedb

use crate::database::RecordStore;
use crate::database::client::{LanceDbClient, quote_literal};
use crate::database::schema::SchemaManager;
use crate::error::{Result, SearchError};
use crate::models::{EntityType, IndexedRecord, Metadata, RecordKey, SourceId};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt64Array,
};
use async_trait::async_trait;
use futures::StreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LanceRecordStore {
    client: LanceDbClient,
}

impl LanceRecordStore {
    pub async fn open(uri: &str, table_name: &str) -> Result<Self> {
        let client = LanceDbClient::new(uri, table_name).await?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &LanceDbClient {
        &self.client
    }

    /// Create an Arrow RecordBatch from index records
    fn create_record_batch(records: &[IndexedRecord]) -> Result<RecordBatch> {
        let dimension = records
            .first()
            .map(|r| r.embedding.len())
            .ok_or_else(|| SearchError::Database("Cannot write an empty batch".to_string()))?;

        if records.iter().any(|r| r.embedding.len() != dimension) {
            return Err(SearchError::Database(
                "Mixed embedding dimensions in one batch".to_string(),
            ));
        }

        let schema = SchemaManager::get_records_schema(dimension);

        let ids: StringArray = records.iter().map(|r| Some(r.record_id())).collect();
        let entity_types: StringArray = records
            .iter()
            .map(|r| Some(r.key.entity_type.as_str()))
            .collect();
        let source_ids: StringArray = records
            .iter()
            .map(|r| Some(r.key.source_id.as_str()))
            .collect();
        let texts: StringArray = records.iter().map(|r| Some(r.text.as_str())).collect();

        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(r.metadata.as_ref()))
            .collect::<std::result::Result<_, _>>()?;
        let metadata: StringArray = metadata.iter().map(|m| Some(m.as_str())).collect();

        let versions: UInt64Array = records.iter().map(|r| Some(r.version)).collect();
        let updated_ats: UInt64Array = records.iter().map(|r| Some(r.updated_at)).collect();

        // Embedding array (FixedSizeList of Float32)
        let embedding_values: Float32Array = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();

        let embedding_list =
            FixedSizeListArray::try_new_from_values(embedding_values, dimension as i32).map_err(
                |e| SearchError::Database(format!("Failed to create embedding array: {}", e)),
            )?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(ids),
                Arc::new(entity_types),
                Arc::new(source_ids),
                Arc::new(texts),
                Arc::new(metadata),
                Arc::new(versions),
                Arc::new(updated_ats),
                Arc::new(embedding_list),
            ],
        )
        .map_err(|e| SearchError::Database(format!("Failed to create record batch: {}", e)))
    }

    fn parse_batch(batch: &RecordBatch) -> Result<Vec<IndexedRecord>> {
        let entity_types = string_column(batch, "entity_type")?;
        let source_ids = string_column(batch, "source_id")?;
        let texts = string_column(batch, "text")?;
        let metadata = string_column(batch, "metadata")?;
        let versions = u64_column(batch, "version")?;
        let updated_ats = u64_column(batch, "updated_at")?;
        let embeddings = batch
            .column_by_name("embedding")
            .ok_or_else(|| SearchError::Database("Missing 'embedding' column".to_string()))?
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| SearchError::Database("Invalid 'embedding' column type".to_string()))?;

        let mut records = Vec::with_capacity(batch.num_rows());

        for i in 0..batch.num_rows() {
            let entity_type: EntityType = match entity_types.value(i).parse() {
                Ok(entity_type) => entity_type,
                Err(e) => {
                    warn!("Skipping stored row with {}", e);
                    continue;
                }
            };

            let fields: Metadata = serde_json::from_str(metadata.value(i))?;
            let vector = embeddings.value(i);
            let values = vector
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| SearchError::Database("Invalid embedding values".to_string()))?;

            records.push(IndexedRecord {
                key: RecordKey::new(entity_type, SourceId::new(source_ids.value(i))),
                text: texts.value(i).to_string(),
                metadata: Arc::new(fields),
                embedding: Arc::from(values.values().as_ref()),
                version: versions.value(i),
                updated_at: updated_ats.value(i),
            });
        }

        Ok(records)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Database(format!("Missing '{}' column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SearchError::Database(format!("Invalid '{}' column type", name)))
}

fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Database(format!("Missing '{}' column", name)))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| SearchError::Database(format!("Invalid '{}' column type", name)))
}

#[async_trait]
impl RecordStore for LanceRecordStore {
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let batch = Self::create_record_batch(records)?;
        let schema = batch.schema();
        let table_name = self.client.table_name();

        if !self.client.table_exists(table_name).await? {
            self.client
                .get_connection()
                .create_table(
                    table_name,
                    RecordBatchIterator::new(vec![Ok(batch)], schema),
                )
                .execute()
                .await
                .map_err(|e| SearchError::Database(format!("Failed to create table: {}", e)))?;
            info!("Created new table: {}", table_name);
            return Ok(());
        }

        let table = self.client.get_table(table_name).await?;

        // One merge keyed by id: rows are replaced or inserted together
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema)))
            .await
            .map_err(|e| SearchError::Database(format!("Failed to upsert records: {}", e)))?;

        debug!("Persisted {} records", records.len());
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        let table_name = self.client.table_name();
        if !self.client.table_exists(table_name).await? {
            return Ok(());
        }

        let table = self.client.get_table(table_name).await?;
        let predicate = format!("id = {}", quote_literal(&key.record_id()));

        table.delete(&predicate).await.map_err(|e| {
            SearchError::Database(format!("Failed to delete record {}: {}", key, e))
        })?;

        debug!("Deleted persisted record {}", key);
        Ok(())
    }

    async fn load(&self, entity_type: EntityType) -> Result<Vec<IndexedRecord>> {
        let table_name = self.client.table_name();
        if !self.client.table_exists(table_name).await? {
            return Ok(Vec::new());
        }

        let table = self.client.get_table(table_name).await?;
        let filter = format!("entity_type = {}", quote_literal(entity_type.as_str()));
        let count = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| SearchError::Database(format!("Failed to count rows: {}", e)))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut stream = table
            .query()
            .only_if(filter)
            .limit(count)
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to scan records: {}", e)))?;

        let mut records = Vec::with_capacity(count);
        while let Some(batch_result) = stream.next().await {
            let batch = batch_result.map_err(|e| {
                SearchError::Database(format!("Failed to read result batch: {}", e))
            })?;
            records.extend(Self::parse_batch(&batch)?);
        }

        debug!(%entity_type, "Loaded {} persisted records", records.len());
        Ok(records)
    }

    async fn reset(&self) -> Result<()> {
        SchemaManager::new(&self.client).drop_all_tables().await
    }

    async fn count(&self) -> Result<usize> {
        self.client.get_record_count().await
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await.map(|_| ())
    }

    fn describe(&self) -> String {
        format!("lancedb {} ({})", self.client.uri(), self.client.table_name())
    }
}
