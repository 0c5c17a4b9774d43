// file: src/index/embedding_index.rs
// description: per-entity-type vector index with write-through persistence
// reference: single-writer / multi-reader snapshot index

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::hnsw::HnswParams;
use super::namespace::NamespaceSnapshot;
use super::{IndexStats, NamespaceStats, UpsertOutcome, VectorIndex};
use crate::database::RecordStore;
use crate::embedding::{EmbeddingService, ensure_dimension};
use crate::error::{Result, SearchError};
use crate::models::record::unix_now;
use crate::models::{Candidate, EntityType, IndexedRecord, NormalizedRecord, RecordKey, SourceId};

const EMBED_CONCURRENCY: usize = 4;

struct Namespace {
    snapshot: RwLock<Arc<NamespaceSnapshot>>,
    writer: Mutex<()>,
}

impl Namespace {
    fn new(snapshot: NamespaceSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Arc<NamespaceSnapshot>> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| SearchError::IndexUnavailable("index snapshot lock poisoned".to_string()))
    }

    fn publish(&self, next: NamespaceSnapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| SearchError::IndexUnavailable("index snapshot lock poisoned".to_string()))?;
        *guard = Arc::new(next);
        Ok(())
    }
}

/// Result of one bulk upsert call.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub reembedded: usize,
    pub metadata_only: usize,
    pub unchanged: usize,
    pub failed: Vec<(RecordKey, SearchError)>,
}

impl BatchOutcome {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted { .. } => self.inserted += 1,
            UpsertOutcome::Reembedded { .. } => self.reembedded += 1,
            UpsertOutcome::MetadataOnly => self.metadata_only += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn applied(&self) -> usize {
        self.inserted + self.reembedded + self.metadata_only + self.unchanged
    }
}

/// Changes pulled in by [`EmbeddingIndex::refresh_from_store`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub upserted: usize,
    pub removed: usize,
}

/// In-memory HNSW namespaces, one per entity type, backed by a [`RecordStore`].
///
/// Searches clone the current snapshot `Arc` and never wait on writers.
/// Writers for one namespace are serialised and persist before publishing, so
/// a returned `upsert` is visible to the next `search` in this process.
pub struct EmbeddingIndex {
    namespaces: BTreeMap<EntityType, Namespace>,
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn RecordStore>,
    dimension: usize,
}

enum Plan {
    Skip,
    Metadata(NormalizedRecord),
    Embed(NormalizedRecord, u64),
}

impl EmbeddingIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn RecordStore>,
        params: HnswParams,
    ) -> Self {
        let dimension = embedder.dimension();
        let namespaces = EntityType::ALL
            .into_iter()
            .map(|entity_type| {
                let snapshot = NamespaceSnapshot::new(entity_type, params, dimension);
                (entity_type, Namespace::new(snapshot))
            })
            .collect();

        Self {
            namespaces,
            embedder,
            store,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn namespace(&self, entity_type: EntityType) -> Result<&Namespace> {
        self.namespaces.get(&entity_type).ok_or_else(|| {
            SearchError::IndexUnavailable(format!("no namespace for {}", entity_type))
        })
    }

    fn plan(snapshot: &NamespaceSnapshot, record: NormalizedRecord) -> Plan {
        match snapshot.get(record.source_id()) {
            Some(previous) if previous.text == record.text => {
                if *previous.metadata == record.metadata {
                    Plan::Skip
                } else {
                    Plan::Metadata(record)
                }
            }
            Some(previous) => {
                let version = previous.version + 1;
                Plan::Embed(record, version)
            }
            None => Plan::Embed(record, 1),
        }
    }

    async fn embed(&self, record: NormalizedRecord, version: u64) -> Result<IndexedRecord> {
        let vector = self.embedder.embed(&record.text).await?;
        let vector = ensure_dimension(vector, self.dimension)?;
        Ok(IndexedRecord::new(record, vector, version))
    }

    /// Upserts many records, cloning each touched namespace once.
    ///
    /// Embedding failures are reported per record; a persistence failure fails
    /// the namespace's whole batch and leaves its snapshot untouched.
    pub async fn upsert_batch(&self, records: Vec<NormalizedRecord>) -> Result<BatchOutcome> {
        let mut by_type: BTreeMap<EntityType, Vec<NormalizedRecord>> = BTreeMap::new();
        for record in records {
            by_type.entry(record.entity_type()).or_default().push(record);
        }

        let mut outcome = BatchOutcome::default();

        for (entity_type, records) in by_type {
            let ns = self.namespace(entity_type)?;
            let _writer = ns.writer.lock().await;
            let current = ns.load()?;

            // Later duplicates of the same key win, matching arrival order.
            let mut latest: Vec<NormalizedRecord> = Vec::with_capacity(records.len());
            let mut positions: HashMap<SourceId, usize> = HashMap::new();
            for record in records {
                match positions.get(record.source_id()) {
                    Some(&pos) => latest[pos] = record,
                    None => {
                        positions.insert(record.source_id().clone(), latest.len());
                        latest.push(record);
                    }
                }
            }

            let mut metadata_updates = Vec::new();
            let mut to_embed = Vec::new();
            for record in latest {
                match Self::plan(&current, record) {
                    Plan::Skip => outcome.unchanged += 1,
                    Plan::Metadata(record) => metadata_updates.push(record),
                    Plan::Embed(record, version) => to_embed.push((record, version)),
                }
            }

            let embedded: Vec<(RecordKey, u64, Result<IndexedRecord>)> = stream::iter(to_embed)
                .map(|(record, version)| async move {
                    let key = record.key.clone();
                    (key, version, self.embed(record, version).await)
                })
                .buffered(EMBED_CONCURRENCY)
                .collect()
                .await;

            let now = unix_now();
            let mut next = NamespaceSnapshot::clone(&current);
            let mut ready: Vec<IndexedRecord> = Vec::new();
            let mut outcomes: Vec<UpsertOutcome> = Vec::new();

            for record in metadata_updates {
                let source_id = record.source_id().clone();
                if let Some(updated) = next.apply_metadata(&source_id, record.metadata, now) {
                    ready.push(updated);
                    outcomes.push(UpsertOutcome::MetadataOnly);
                }
            }

            for (key, version, result) in embedded {
                match result {
                    Ok(record) => {
                        next.apply_upsert(record.clone())?;
                        ready.push(record);
                        outcomes.push(if version == 1 {
                            UpsertOutcome::Inserted { version }
                        } else {
                            UpsertOutcome::Reembedded { version }
                        });
                    }
                    Err(e) => {
                        warn!(record = %key, error = %e, "Embedding failed, record not indexed");
                        outcome.failed.push((key, e));
                    }
                }
            }

            if ready.is_empty() {
                continue;
            }

            // Snapshot stays private until the rows are durable
            self.store.upsert(&ready).await?;
            next.finish_write()?;
            ns.publish(next)?;

            for applied in outcomes {
                outcome.record(applied);
            }
            debug!(%entity_type, applied = outcome.applied(), "Published namespace snapshot");
        }

        Ok(outcome)
    }

    /// Brings this process in line with the persisted rows.
    ///
    /// Each namespace is read from the store under its writer lock, so a local
    /// upsert or delete is never undone by rows loaded before it. Rows whose
    /// version, text or timestamp differ from the live entry are applied; live
    /// entries with no row are removed.
    pub async fn refresh_from_store(&self) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        for (entity_type, ns) in &self.namespaces {
            let _writer = ns.writer.lock().await;
            let mut stored: HashMap<SourceId, IndexedRecord> = HashMap::new();
            for row in self.store.load(*entity_type).await? {
                if row.embedding.len() != self.dimension {
                    warn!(
                        record = %row.key,
                        "Skipping stored row with {} dimensions, index uses {}",
                        row.embedding.len(),
                        self.dimension
                    );
                    continue;
                }
                stored.insert(row.key.source_id.clone(), row);
            }

            let current = ns.load()?;
            let removed: Vec<SourceId> = current
                .records()
                .filter(|record| !stored.contains_key(&record.key.source_id))
                .map(|record| record.key.source_id.clone())
                .collect();

            let changed: Vec<IndexedRecord> = stored
                .into_values()
                .filter(|row| match current.get(&row.key.source_id) {
                    Some(live) => {
                        live.version != row.version
                            || live.text != row.text
                            || live.updated_at != row.updated_at
                    }
                    None => true,
                })
                .collect();

            if removed.is_empty() && changed.is_empty() {
                continue;
            }

            let mut next = NamespaceSnapshot::clone(&current);
            for source_id in &removed {
                next.apply_delete(source_id);
            }
            report.removed += removed.len();
            report.upserted += changed.len();
            for row in changed {
                next.apply_upsert(row)?;
            }
            next.finish_write()?;
            ns.publish(next)?;
            debug!(%entity_type, "Namespace refreshed from store");
        }

        Ok(report)
    }

    /// Drops every persisted row and clears all namespaces.
    pub async fn reset(&self) -> Result<()> {
        for ns in self.namespaces.values() {
            let _writer = ns.writer.lock().await;
            let current = ns.load()?;
            let mut next = NamespaceSnapshot::clone(&current);
            let ids: Vec<SourceId> = current.records().map(|r| r.key.source_id.clone()).collect();
            for source_id in &ids {
                next.apply_delete(source_id);
            }
            next.finish_write()?;
            ns.publish(next)?;
        }
        self.store.reset().await?;
        warn!("Index reset: all records removed");
        Ok(())
    }

    pub fn get(&self, key: &RecordKey) -> Result<Option<Arc<IndexedRecord>>> {
        let snapshot = self.namespace(key.entity_type)?.load()?;
        Ok(snapshot.get(&key.source_id).cloned())
    }
}

#[async_trait]
impl VectorIndex for EmbeddingIndex {
    async fn search(
        &self,
        entity_type: EntityType,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<Candidate>> {
        let Some(ns) = self.namespaces.get(&entity_type) else {
            return Ok(Vec::new());
        };
        if vector.len() != self.dimension {
            return Err(SearchError::EmbeddingService(format!(
                "query has {} dimensions, index uses {}",
                vector.len(),
                self.dimension
            )));
        }

        let snapshot = ns.load()?;
        if snapshot.live_len() == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let query = vector.to_vec();
        tokio::task::spawn_blocking(move || snapshot.search(&query, k))
            .await
            .map_err(|e| SearchError::IndexUnavailable(format!("search task failed: {}", e)))
    }

    async fn upsert(&self, record: NormalizedRecord) -> Result<UpsertOutcome> {
        let ns = self.namespace(record.entity_type())?;
        let _writer = ns.writer.lock().await;
        let current = ns.load()?;

        let mut next = NamespaceSnapshot::clone(&current);
        let (indexed, outcome) = match Self::plan(&current, record) {
            Plan::Skip => return Ok(UpsertOutcome::Unchanged),
            Plan::Metadata(record) => {
                let source_id = record.source_id().clone();
                let Some(updated) = next.apply_metadata(&source_id, record.metadata, unix_now())
                else {
                    return Ok(UpsertOutcome::Unchanged);
                };
                (updated, UpsertOutcome::MetadataOnly)
            }
            Plan::Embed(record, version) => {
                let indexed = self.embed(record, version).await?;
                next.apply_upsert(indexed.clone())?;
                let outcome = if version == 1 {
                    UpsertOutcome::Inserted { version }
                } else {
                    UpsertOutcome::Reembedded { version }
                };
                (indexed, outcome)
            }
        };

        // Snapshot stays private until the row is durable
        self.store.upsert(std::slice::from_ref(&indexed)).await?;
        next.finish_write()?;
        ns.publish(next)?;

        let key = indexed.key;
        debug!(record = %key, ?outcome, "Upserted record");
        Ok(outcome)
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool> {
        let ns = self.namespace(key.entity_type)?;
        let _writer = ns.writer.lock().await;
        let current = ns.load()?;

        // Always forward to the store; another process may hold the row.
        self.store.delete(key).await?;

        if current.get(&key.source_id).is_none() {
            return Ok(false);
        }

        let mut next = NamespaceSnapshot::clone(&current);
        next.apply_delete(&key.source_id);
        next.finish_write()?;
        ns.publish(next)?;

        debug!(record = %key, "Deleted record");
        Ok(true)
    }

    fn stats(&self) -> Result<IndexStats> {
        let mut namespaces = BTreeMap::new();
        for (entity_type, ns) in &self.namespaces {
            let snapshot = ns.load()?;
            namespaces.insert(
                *entity_type,
                NamespaceStats {
                    live: snapshot.live_len(),
                    tombstones: snapshot.tombstones(),
                },
            );
        }
        Ok(IndexStats::new(namespaces, self.dimension))
    }

    fn known_places(&self) -> Vec<String> {
        let mut places = BTreeSet::new();
        for ns in self.namespaces.values() {
            if let Ok(snapshot) = ns.load() {
                places.extend(snapshot.places().iter().cloned());
            }
        }
        places.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryRecordStore;
    use crate::embedding::HashingEmbedder;
    use crate::normalizer::RecordNormalizer;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingService for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn counting() -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            inner: HashingEmbedder::new(256),
            calls: AtomicUsize::new(0),
        })
    }

    fn donor(id: &str, fields: serde_json::Value) -> NormalizedRecord {
        RecordNormalizer::new()
            .normalize(
                EntityType::Donor,
                &SourceId::from(id),
                fields.as_object().unwrap(),
            )
            .unwrap()
    }

    fn index_with(embedder: Arc<CountingEmbedder>, store: Arc<MemoryRecordStore>) -> EmbeddingIndex {
        EmbeddingIndex::new(embedder, store, HnswParams::default())
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let embedder = counting();
        let index = index_with(embedder.clone(), Arc::new(MemoryRecordStore::new()));
        let record = donor("1", json!({"name": "Asha", "blood_group": "O+", "city": "Udaipur"}));

        let first = index.upsert(record.clone()).await.unwrap();
        let second = index.upsert(record).await.unwrap();

        assert_eq!(first, UpsertOutcome::Inserted { version: 1 });
        assert_eq!(second, UpsertOutcome::Unchanged);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(index.stats().unwrap().live(EntityType::Donor), 1);
    }

    #[tokio::test]
    async fn test_changed_text_bumps_version() {
        let embedder = counting();
        let index = index_with(embedder.clone(), Arc::new(MemoryRecordStore::new()));

        index.upsert(donor("1", json!({"name": "Asha", "city": "Udaipur"}))).await.unwrap();
        let outcome = index
            .upsert(donor("1", json!({"name": "Asha", "city": "Jaipur"})))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Reembedded { version: 2 });
        let stored = index.get(&RecordKey::new(EntityType::Donor, "1")).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert!(stored.text.contains("Jaipur"));
        assert_eq!(index.stats().unwrap().live(EntityType::Donor), 1);
    }

    #[tokio::test]
    async fn test_metadata_change_keeps_version_and_persists() {
        let embedder = counting();
        let store = Arc::new(MemoryRecordStore::new());
        let index = index_with(embedder.clone(), store.clone());

        index.upsert(donor("1", json!({"name": "Asha", "city": "Udaipur"}))).await.unwrap();
        let outcome = index
            .upsert(donor("1", json!({"name": "Asha", "city": "Udaipur", "email": "asha@example.org"})))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::MetadataOnly);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        let live = index.get(&RecordKey::new(EntityType::Donor, "1")).unwrap().unwrap();
        assert_eq!(live.version, 1);
        assert_eq!(live.metadata.get("email"), Some(&json!("asha@example.org")));

        let rows = store.load(EntityType::Donor).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metadata.get("email"), Some(&json!("asha@example.org")));
    }

    #[tokio::test]
    async fn test_search_observes_upsert_and_delete() {
        let embedder = counting();
        let index = index_with(embedder.clone(), Arc::new(MemoryRecordStore::new()));
        let record = donor("1", json!({"name": "Asha", "blood_group": "O+", "city": "Udaipur"}));
        let query = embedder.inner.embed_sync(&record.text);

        index.upsert(record).await.unwrap();
        let hits = index.search(EntityType::Donor, &query, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].raw_score - 1.0).abs() < 1e-5);

        assert!(index.delete(&RecordKey::new(EntityType::Donor, "1")).await.unwrap());
        assert!(index.search(EntityType::Donor, &query, 5).await.unwrap().is_empty());
        assert!(!index.delete(&RecordKey::new(EntityType::Donor, "1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_namespace_returns_nothing() {
        let index = index_with(counting(), Arc::new(MemoryRecordStore::new()));
        let hits = index.search(EntityType::Hospital, &vec![0.1; 256], 5).await.unwrap();
        assert!(hits.is_empty());

        let err = index.search(EntityType::Hospital, &[0.1; 3], 5).await.unwrap_err();
        assert!(matches!(err, SearchError::EmbeddingService(_)));
    }

    #[tokio::test]
    async fn test_refresh_pulls_other_writers() {
        let store = Arc::new(MemoryRecordStore::new());
        let writer = index_with(counting(), store.clone());
        let reader = index_with(counting(), store.clone());

        writer
            .upsert(donor("1", json!({"name": "Asha", "city": "Udaipur"})))
            .await
            .unwrap();
        writer
            .upsert(donor("2", json!({"name": "Ravi", "city": "Jaipur"})))
            .await
            .unwrap();
        assert_eq!(reader.stats().unwrap().total_live, 0);

        let report = reader.refresh_from_store().await.unwrap();
        assert_eq!(report, RefreshReport { upserted: 2, removed: 0 });
        assert_eq!(reader.known_places(), vec!["Jaipur".to_string(), "Udaipur".to_string()]);

        writer.delete(&RecordKey::new(EntityType::Donor, "2")).await.unwrap();
        let report = reader.refresh_from_store().await.unwrap();
        assert_eq!(report, RefreshReport { upserted: 0, removed: 1 });

        let again = reader.refresh_from_store().await.unwrap();
        assert_eq!(again, RefreshReport::default());
    }

    #[tokio::test]
    async fn test_batch_upsert_counts_outcomes() {
        let embedder = counting();
        let index = index_with(embedder.clone(), Arc::new(MemoryRecordStore::new()));

        let outcome = index
            .upsert_batch(vec![
                donor("1", json!({"name": "Asha"})),
                donor("2", json!({"name": "Ravi"})),
                donor("2", json!({"name": "Ravi", "city": "Jaipur"})),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert!(outcome.failed.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        let ravi = index.get(&RecordKey::new(EntityType::Donor, "2")).unwrap().unwrap();
        assert!(ravi.text.contains("Jaipur"));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let store = Arc::new(MemoryRecordStore::new());
        let index = index_with(counting(), store.clone());
        index.upsert(donor("1", json!({"name": "Asha"}))).await.unwrap();

        index.reset().await.unwrap();
        assert_eq!(index.stats().unwrap().total_live, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    /// Store whose reads return rows that are already stale when they arrive.
    struct LaggingStore {
        inner: MemoryRecordStore,
        lag: Duration,
    }

    #[async_trait]
    impl RecordStore for LaggingStore {
        async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
            self.inner.upsert(records).await
        }

        async fn delete(&self, key: &RecordKey) -> Result<()> {
            self.inner.delete(key).await
        }

        async fn load(&self, entity_type: EntityType) -> Result<Vec<IndexedRecord>> {
            let rows = self.inner.load(entity_type).await?;
            tokio::time::sleep(self.lag).await;
            Ok(rows)
        }

        async fn reset(&self) -> Result<()> {
            self.inner.reset().await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn describe(&self) -> String {
            "lagging".to_string()
        }
    }

    fn lagging_index() -> Arc<EmbeddingIndex> {
        let store = Arc::new(LaggingStore {
            inner: MemoryRecordStore::new(),
            lag: Duration::from_millis(200),
        });
        Arc::new(EmbeddingIndex::new(counting(), store, HnswParams::default()))
    }

    #[tokio::test]
    async fn test_refresh_keeps_upsert_made_during_load() {
        let index = lagging_index();

        let refreshing = tokio::spawn({
            let index = index.clone();
            async move { index.refresh_from_store().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        index
            .upsert(donor("1", json!({"name": "Asha", "city": "Udaipur"})))
            .await
            .unwrap();
        refreshing.await.unwrap().unwrap();

        assert_eq!(index.stats().unwrap().live(EntityType::Donor), 1);
        assert!(index.get(&RecordKey::new(EntityType::Donor, "1")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_does_not_revive_delete_made_during_load() {
        let index = lagging_index();
        index
            .upsert(donor("2", json!({"name": "Ravi", "city": "Jaipur"})))
            .await
            .unwrap();

        let refreshing = tokio::spawn({
            let index = index.clone();
            async move { index.refresh_from_store().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        index.delete(&RecordKey::new(EntityType::Donor, "2")).await.unwrap();
        refreshing.await.unwrap().unwrap();

        assert_eq!(index.stats().unwrap().live(EntityType::Donor), 0);
        assert!(index.get(&RecordKey::new(EntityType::Donor, "2")).unwrap().is_none());
    }
}
