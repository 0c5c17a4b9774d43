// file: src/pipeline/context.rs
// description: wires providers, store, index, engine and ingest worker together
// reference: service construction shared by the cli, http and mcp front ends

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use super::engine::SearchEngine;
use super::ingest::{EventApplier, IngestWorker};
use super::progress::IngestStats;
use super::refresh::IndexRefresher;
use crate::config::Config;
use crate::database::{RecordStore, open_store};
use crate::embedding::{EmbeddingService, build_embedder};
use crate::error::Result;
use crate::index::{EmbeddingIndex, HnswParams, IndexStats, VectorIndex};
use crate::models::{RecordEvent, SearchRequest, SearchResponse};
use crate::summary::{GenerativeService, build_generator};
use crate::utils::retry::RetryPolicy;
use crate::utils::telemetry::{HealthReport, HealthStatus, probe};
use crate::utils::validation::Validator;

/// Everything a running process needs to answer queries and take events.
pub struct SearchContext {
    config: Config,
    index: Arc<EmbeddingIndex>,
    engine: SearchEngine,
    worker: IngestWorker,
    refresher: Mutex<Option<IndexRefresher>>,
}

impl SearchContext {
    /// Builds the configured providers, opens the store and loads every
    /// persisted row into the index before returning.
    pub async fn init(config: &Config) -> Result<Self> {
        let embedder = build_embedder(&config.embedding)?;
        let generator = build_generator(&config.generation)?;
        let store = open_store(&config.index).await?;
        Self::with_components(config, embedder, generator, store).await
    }

    /// Same as [`SearchContext::init`] with caller-supplied services.
    pub async fn with_components(
        config: &Config,
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerativeService>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let index = Arc::new(EmbeddingIndex::new(
            embedder.clone(),
            store.clone(),
            HnswParams::from_config(&config.index),
        ));

        let loaded = index.refresh_from_store().await?;
        info!(
            records = loaded.upserted,
            store = %store.describe(),
            embedder = embedder.name(),
            generator = generator.name(),
            "Index loaded"
        );

        let engine = SearchEngine::new(config, index.clone(), embedder, generator);
        let applier = Arc::new(EventApplier::new(
            index.clone(),
            RetryPolicy::from_config(&config.ingest),
        ));
        let worker = IngestWorker::spawn(applier, &config.ingest);

        Ok(Self {
            config: config.clone(),
            index,
            engine,
            worker,
            refresher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.engine
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.engine.search(request).await
    }

    /// Queues an event for the background worker.
    pub async fn submit(&self, event: RecordEvent) -> Result<()> {
        Validator::validate_event(&event)?;
        self.worker.enqueue(event).await
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.index.stats()
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.worker.stats()
    }

    /// Starts the periodic store refresh when persistence is on and an
    /// interval is configured. Calling it twice keeps the first task.
    pub fn start_refresher(&self) {
        let interval = self.config.index.refresh_interval_secs;
        if !self.config.index.persist || interval == 0 {
            return;
        }

        match self.refresher.lock() {
            Ok(mut slot) if slot.is_none() => {
                *slot = Some(IndexRefresher::spawn(
                    self.index.clone(),
                    Duration::from_secs(interval),
                ));
                info!(interval_secs = interval, "Store refresher started");
            }
            Ok(_) => {}
            Err(_) => warn!("Refresher lock poisoned; not starting"),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let embedder = self.engine.embedder();
        let generator = self.engine.generator();
        let store = self.index.store();

        let (embedding, storage, generation) = tokio::join!(
            probe("embedding", HealthStatus::Unhealthy, embedder.health_check()),
            probe("store", HealthStatus::Unhealthy, store.ping()),
            probe("generation", HealthStatus::Degraded, generator.health_check()),
        );

        HealthReport::new(
            vec![embedding, storage, generation],
            env!("CARGO_PKG_VERSION").to_string(),
        )
    }

    /// Drains queued events and stops background tasks.
    pub async fn shutdown(&self) -> IngestStats {
        let refresher = self.refresher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(refresher) = refresher {
            refresher.stop().await;
        }
        let stats = self.worker.shutdown().await;
        info!(
            upserted = stats.upserted,
            deleted = stats.deleted,
            skipped = stats.skipped,
            failed = stats.failed,
            "Ingest worker stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;
    use crate::database::MemoryRecordStore;
    use crate::embedding::HashingEmbedder;
    use crate::models::EntityType;
    use crate::summary::TemplateGenerator;
    use serde_json::json;

    fn offline_config() -> Config {
        let mut config = Config::default_config();
        config.embedding.provider = EmbeddingProvider::Hashing;
        config.embedding.dimension = 256;
        config.index.persist = false;
        config
    }

    #[tokio::test]
    async fn test_init_offline_and_health() {
        let service = SearchContext::init(&offline_config()).await.unwrap();
        let report = service.health().await;
        assert_eq!(report.overall_status, HealthStatus::Healthy);
        assert_eq!(service.stats().unwrap().total_live, 0);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_submitted_events_become_searchable() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let service = SearchContext::with_components(
            &offline_config(),
            Arc::new(HashingEmbedder::new(256)),
            Arc::new(TemplateGenerator),
            store,
        )
        .await
        .unwrap();

        let fields = json!({"name": "Asha", "age": 29, "blood_group": "O+", "city": "Udaipur"});
        service
            .submit(RecordEvent::upsert(
                EntityType::Donor,
                "1",
                fields.as_object().cloned().unwrap(),
            ))
            .await
            .unwrap();
        assert!(service.submit(RecordEvent::delete(EntityType::Donor, " ")).await.is_err());

        let stats = service.shutdown().await;
        assert_eq!(stats.upserted, 1);

        let response = service
            .search(&SearchRequest::new("O+ donors in Udaipur"))
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].metadata["name"], "Asha");
    }
}
