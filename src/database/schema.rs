// file: src/database/schema.rs
// description: LanceDB schema management for persisted index records
// reference: https://docs.rs/lancedb

use crate::database::client::LanceDbClient;
use crate::error::{Result, SearchError};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;
use tracing::{info, warn};

pub struct SchemaManager<'a> {
    client: &'a LanceDbClient,
}

impl<'a> SchemaManager<'a> {
    pub fn new(client: &'a LanceDbClient) -> Self {
        Self { client }
    }

    pub async fn verify_schema(&self) -> Result<bool> {
        let table_name = self.client.table_name();

        if !self.client.table_exists(table_name).await? {
            warn!("Table '{}' does not exist", table_name);
            return Ok(false);
        }

        info!("Table '{}' exists", table_name);
        Ok(true)
    }

    /// Arrow schema for index records; one row per live `(entity_type, source_id)`.
    pub fn get_records_schema(embedding_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("entity_type", DataType::Utf8, false),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            // Source fields as a JSON object
            Field::new("metadata", DataType::Utf8, false),
            Field::new("version", DataType::UInt64, false),
            Field::new("updated_at", DataType::UInt64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    embedding_dim as i32,
                ),
                false,
            ),
        ]))
    }

    pub async fn drop_all_tables(&self) -> Result<()> {
        warn!("Dropping index tables in LanceDB");

        let table_name = self.client.table_name();

        if self.client.table_exists(table_name).await? {
            self.client
                .get_connection()
                .drop_table(table_name)
                .await
                .map_err(|e| {
                    SearchError::Database(format!("Failed to drop table {}: {}", table_name, e))
                })?;
            info!("Dropped table: {}", table_name);
        }

        Ok(())
    }
}
