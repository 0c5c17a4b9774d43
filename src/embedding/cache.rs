// file: src/embedding/cache.rs
// description: content-addressed cache in front of an embedding service
// reference: https://docs.rs/dashmap

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::EmbeddingService;
use crate::error::Result;
use crate::models::record::compute_hash;

/// Caches vectors by SHA-256 of the input text. Failed calls are never cached.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingService>,
    entries: DashMap<String, Arc<[f32]>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingService>, max_entries: usize) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn insert(&self, key: String, vector: Arc<[f32]>) {
        if self.entries.len() >= self.max_entries {
            // Evict a quarter when full
            let to_remove: Vec<String> = self
                .entries
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|entry| entry.key().clone())
                .collect();
            for key in to_remove {
                self.entries.remove(&key);
            }
            debug!("Evicted embedding cache entries, {} remain", self.entries.len());
        }
        self.entries.insert(key, vector);
    }
}

#[async_trait]
impl EmbeddingService for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = compute_hash(text);

        if let Some(entry) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value().to_vec());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = self.inner.embed(text).await?;
        self.insert(key, Arc::from(vector.as_slice()));
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}
