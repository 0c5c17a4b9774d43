// file: src/embedding/mod.rs
// description: embedding service contract and provider construction
// reference: https://docs.rs/async-trait

pub mod cache;
pub mod hashing;
pub mod openai;

pub use cache::{CacheStats, CachedEmbedder};
pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbeddingClient;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Result, SearchError};

/// Black-box text embedder with a fixed output dimension.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<()> {
        self.embed("blood bank health check").await.map(|_| ())
    }
}

/// Rejects vectors that do not match the deployment dimension.
pub fn ensure_dimension(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if vector.len() != expected {
        return Err(SearchError::EmbeddingService(format!(
            "expected {} dimensions, got {}",
            expected,
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(SearchError::EmbeddingService(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(vector)
}

/// Builds the configured provider wrapped in the shared vector cache.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingService>> {
    let inner: Arc<dyn EmbeddingService> = match config.provider {
        EmbeddingProvider::Openai => Arc::new(OpenAiEmbeddingClient::new(
            &config.base_url,
            &config.model,
            config.api_key.clone(),
            config.dimension,
            Duration::from_secs(config.timeout_secs),
        )?),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
    };

    if config.cache_max_entries == 0 {
        return Ok(inner);
    }

    Ok(Arc::new(CachedEmbedder::new(inner, config.cache_max_entries)))
}
