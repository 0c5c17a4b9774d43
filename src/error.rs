// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use crate::models::EntityType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

pub const UNAVAILABLE_MESSAGE: &str = "search temporarily unavailable";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Normalization failed for {entity_type} record {source_id:?}: {reason}")]
    Normalization {
        entity_type: EntityType,
        source_id: Option<String>,
        reason: String,
    },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    pub fn normalization(
        entity_type: EntityType,
        source_id: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Normalization {
            entity_type,
            source_id: source_id.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Failures that may succeed when the same operation is attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IndexUnavailable(_)
                | Self::EmbeddingService(_)
                | Self::Database(_)
                | Self::Io(_)
        )
    }

    /// Text safe to hand back to a caller of the query endpoint.
    pub fn public_message(&self) -> String {
        match self {
            Self::IndexUnavailable(_) | Self::Database(_) => UNAVAILABLE_MESSAGE.to_string(),
            Self::EmbeddingService(_) => "query could not be embedded".to_string(),
            Self::Validation(msg) => msg.clone(),
            _ => "search failed".to_string(),
        }
    }
}
