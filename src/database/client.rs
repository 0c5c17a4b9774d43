// file: src/database/client.rs
// description: LanceDB client wrapper with connection management
// reference: https://docs.rs/lancedb

use crate::error::{Result, SearchError};
use lancedb::{Connection, Table, connect};
use tracing::{debug, info};

#[derive(Clone)]
pub struct LanceDbClient {
    connection: Connection,
    uri: String,
    table_name: String,
}

impl LanceDbClient {
    pub async fn new(uri: &str, table_name: &str) -> Result<Self> {
        info!("Connecting to LanceDB at {}", uri);

        let connection = connect(uri)
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            uri: uri.to_string(),
            table_name: table_name.to_string(),
        })
    }

    pub fn get_connection(&self) -> &Connection {
        &self.connection
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub async fn ping(&self) -> Result<bool> {
        debug!("Checking LanceDB connection");

        // Listing tables doubles as a ping
        match self.connection.table_names().execute().await {
            Ok(_) => Ok(true),
            Err(e) => Err(SearchError::Database(format!(
                "LanceDB connection failed: {}",
                e
            ))),
        }
    }

    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.iter().any(|name| name == table_name))
    }

    pub async fn get_table(&self, table_name: &str) -> Result<Table> {
        self.connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| {
                SearchError::Database(format!("Failed to open table {}: {}", table_name, e))
            })
    }

    pub async fn get_record_count(&self) -> Result<usize> {
        if !self.table_exists(&self.table_name).await? {
            return Ok(0);
        }

        let table = self.get_table(&self.table_name).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| SearchError::Database(format!("Failed to count rows: {}", e)))
    }
}

/// Quotes a string literal for a LanceDB filter predicate.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("donor:1"), "'donor:1'");
        assert_eq!(quote_literal("donor:o'neil"), "'donor:o''neil'");
    }

    #[tokio::test]
    async fn test_connect_and_ping() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().join("lancedb");
        let client = LanceDbClient::new(uri.to_str().unwrap(), "records").await.unwrap();

        assert!(client.ping().await.unwrap());
        assert!(!client.table_exists("records").await.unwrap());
        assert_eq!(client.get_record_count().await.unwrap(), 0);
    }
}
