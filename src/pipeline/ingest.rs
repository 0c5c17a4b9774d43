// file: src/pipeline/ingest.rs
// description: applies record change events to the index, queued or in bulk
// reference: orchestrates asynchronous ingestion workflow

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::progress::{EventOutcome, IngestCounters, IngestStats, ProgressTracker};
use crate::config::IngestConfig;
use crate::error::{Result, SearchError};
use crate::index::{EmbeddingIndex, VectorIndex};
use crate::models::{NormalizedRecord, RecordEvent, RecordKey};
use crate::normalizer::RecordNormalizer;
use crate::utils::retry::RetryPolicy;

const BULK_CHUNK: usize = 64;

/// Normalizer, then index upsert or delete, for a single event.
pub struct EventApplier {
    index: Arc<dyn VectorIndex>,
    normalizer: RecordNormalizer,
    retry: RetryPolicy,
}

impl EventApplier {
    pub fn new(index: Arc<dyn VectorIndex>, retry: RetryPolicy) -> Self {
        Self {
            index,
            normalizer: RecordNormalizer::new(),
            retry,
        }
    }

    pub async fn apply(&self, event: RecordEvent) -> EventOutcome {
        match event {
            RecordEvent::Upsert {
                entity_type,
                source_id,
                fields,
            } => {
                let record = match self.normalizer.normalize(entity_type, &source_id, &fields) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(%entity_type, source_id = %source_id, error = %e, "Skipping record");
                        return EventOutcome::Skipped;
                    }
                };

                let key = record.key.clone();
                match self
                    .retry
                    .retry("upsert", || self.index.upsert(record.clone()))
                    .await
                {
                    Ok(outcome) => {
                        debug!(record = %key, ?outcome, "Applied upsert");
                        EventOutcome::Upserted
                    }
                    Err(e) => {
                        error!(record = %key, error = %e, "Upsert failed");
                        EventOutcome::Failed
                    }
                }
            }
            RecordEvent::Delete {
                entity_type,
                source_id,
            } => {
                let key = RecordKey::new(entity_type, source_id);
                match self.retry.retry("delete", || self.index.delete(&key)).await {
                    Ok(removed) => {
                        debug!(record = %key, removed, "Applied delete");
                        EventOutcome::Deleted
                    }
                    Err(e) => {
                        error!(record = %key, error = %e, "Delete failed");
                        EventOutcome::Failed
                    }
                }
            }
        }
    }
}

fn lane_for(key: &RecordKey, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % lanes.max(1) as u64) as usize
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background consumer of record change events.
///
/// Events are routed to `parallel_workers` lanes by record key, so different
/// records are applied concurrently while events for one record keep their
/// arrival order.
pub struct IngestWorker {
    sender: Mutex<Option<mpsc::Sender<RecordEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<IngestCounters>,
}

impl IngestWorker {
    pub fn spawn(applier: Arc<EventApplier>, config: &IngestConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(IngestCounters::default());
        let lanes = config.parallel_workers.max(1);
        let lane_capacity = (config.queue_capacity / lanes).max(1);

        let dispatcher = tokio::spawn(dispatch(
            receiver,
            applier,
            Arc::clone(&counters),
            lanes,
            lane_capacity,
        ));

        info!(lanes, queue_capacity = config.queue_capacity, "Ingest worker started");

        Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            counters,
        }
    }

    /// Queues an event, waiting while the queue is full.
    pub async fn enqueue(&self, event: RecordEvent) -> Result<()> {
        let sender = lock(&self.sender)
            .clone()
            .ok_or_else(|| SearchError::IndexUnavailable("ingest worker is shut down".to_string()))?;

        sender
            .send(event)
            .await
            .map_err(|_| SearchError::IndexUnavailable("ingest queue closed".to_string()))
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Closes the queue and waits until every queued event has been applied.
    pub async fn shutdown(&self) -> IngestStats {
        drop(lock(&self.sender).take());
        let dispatcher = lock(&self.dispatcher).take();

        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                error!(error = %e, "Ingest dispatcher ended abnormally");
            }
            let stats = self.stats();
            info!(
                upserted = stats.upserted,
                deleted = stats.deleted,
                skipped = stats.skipped,
                failed = stats.failed,
                "Ingest worker drained"
            );
        }
        self.stats()
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<RecordEvent>,
    applier: Arc<EventApplier>,
    counters: Arc<IngestCounters>,
    lanes: usize,
    lane_capacity: usize,
) {
    let mut senders = Vec::with_capacity(lanes);
    let mut handles = Vec::with_capacity(lanes);

    for _ in 0..lanes {
        let (sender, mut lane) = mpsc::channel::<RecordEvent>(lane_capacity);
        let applier = Arc::clone(&applier);
        let counters = Arc::clone(&counters);

        handles.push(tokio::spawn(async move {
            while let Some(event) = lane.recv().await {
                let outcome = applier.apply(event).await;
                counters.record(outcome);
            }
        }));
        senders.push(sender);
    }

    while let Some(event) = receiver.recv().await {
        let lane = lane_for(&event.key(), lanes);
        if senders[lane].send(event).await.is_err() {
            error!(lane, "Ingest lane stopped; event dropped");
            counters.record(EventOutcome::Failed);
        }
    }

    drop(senders);
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Ingest lane ended abnormally");
        }
    }
}

/// Loads a batch of events straight into the index.
///
/// Only the last event per record counts; earlier ones are skipped. Upserts
/// are embedded and published in chunks, deletes run concurrently.
pub async fn ingest_bulk(
    index: &EmbeddingIndex,
    events: Vec<RecordEvent>,
    retry: &RetryPolicy,
    parallel_workers: usize,
    progress: &ProgressTracker,
) -> IngestStats {
    let mut latest: Vec<RecordEvent> = Vec::with_capacity(events.len());
    let mut positions: HashMap<RecordKey, usize> = HashMap::new();

    for event in events {
        let key = event.key();
        match positions.get(&key) {
            Some(&pos) => {
                latest[pos] = event;
                progress.record(EventOutcome::Skipped);
            }
            None => {
                positions.insert(key, latest.len());
                latest.push(event);
            }
        }
    }

    let normalizer = RecordNormalizer::new();
    let mut upserts: Vec<NormalizedRecord> = Vec::new();
    let mut deletes: Vec<RecordKey> = Vec::new();

    for event in latest {
        match event {
            RecordEvent::Upsert {
                entity_type,
                source_id,
                fields,
            } => match normalizer.normalize(entity_type, &source_id, &fields) {
                Ok(record) => upserts.push(record),
                Err(e) => {
                    warn!(%entity_type, source_id = %source_id, error = %e, "Skipping record");
                    progress.record(EventOutcome::Skipped);
                }
            },
            RecordEvent::Delete {
                entity_type,
                source_id,
            } => deletes.push(RecordKey::new(entity_type, source_id)),
        }
    }

    for chunk in upserts.chunks(BULK_CHUNK) {
        progress.set_message(format!("Embedding {} records", chunk.len()));
        let chunk = chunk.to_vec();

        match retry
            .retry("bulk upsert", || index.upsert_batch(chunk.clone()))
            .await
        {
            Ok(outcome) => {
                progress.record_many(EventOutcome::Upserted, outcome.applied());
                for (key, e) in outcome.failed {
                    let Some(record) = chunk.iter().find(|r| r.key == key) else {
                        progress.record(EventOutcome::Failed);
                        continue;
                    };
                    if !e.is_retryable() {
                        error!(record = %key, error = %e, "Upsert failed");
                        progress.record(EventOutcome::Failed);
                        continue;
                    }
                    match retry.retry("upsert", || index.upsert(record.clone())).await {
                        Ok(_) => progress.record(EventOutcome::Upserted),
                        Err(e) => {
                            error!(record = %key, error = %e, "Upsert failed");
                            progress.record(EventOutcome::Failed);
                        }
                    }
                }
            }
            Err(e) => {
                error!(records = chunk.len(), error = %e, "Bulk upsert chunk failed");
                progress.record_many(EventOutcome::Failed, chunk.len());
            }
        }
    }

    let outcomes: Vec<EventOutcome> = stream::iter(deletes)
        .map(|key| async move {
            match retry.retry("delete", || index.delete(&key)).await {
                Ok(_) => EventOutcome::Deleted,
                Err(e) => {
                    error!(record = %key, error = %e, "Delete failed");
                    EventOutcome::Failed
                }
            }
        })
        .buffer_unordered(parallel_workers.max(1))
        .collect()
        .await;
    outcomes.into_iter().for_each(|outcome| progress.record(outcome));

    progress.get_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryRecordStore;
    use crate::embedding::HashingEmbedder;
    use crate::index::HnswParams;
    use crate::models::{EntityType, Metadata};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn index() -> Arc<EmbeddingIndex> {
        Arc::new(EmbeddingIndex::new(
            Arc::new(HashingEmbedder::new(128)),
            Arc::new(MemoryRecordStore::new()),
            HnswParams::default(),
        ))
    }

    fn config(parallel_workers: usize) -> IngestConfig {
        IngestConfig {
            parallel_workers,
            queue_capacity: 16,
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_worker_applies_events_in_order_per_record() {
        let index = index();
        let applier = Arc::new(EventApplier::new(index.clone(), RetryPolicy::new(1, 1, 2)));
        let worker = IngestWorker::spawn(applier, &config(4));

        worker
            .enqueue(RecordEvent::upsert(EntityType::Donor, "1", fields(json!({"name": "Asha", "city": "Udaipur"}))))
            .await
            .unwrap();
        worker
            .enqueue(RecordEvent::upsert(EntityType::Donor, "1", fields(json!({"name": "Asha", "city": "Jaipur"}))))
            .await
            .unwrap();
        worker
            .enqueue(RecordEvent::upsert(EntityType::Hospital, "7", fields(json!({"name": "City Hospital"}))))
            .await
            .unwrap();
        worker
            .enqueue(RecordEvent::delete(EntityType::Hospital, "7"))
            .await
            .unwrap();
        worker
            .enqueue(RecordEvent::upsert(EntityType::Request, "3", fields(json!({"units_requested": 2}))))
            .await
            .unwrap();

        let stats = worker.shutdown().await;
        assert_eq!(
            stats,
            IngestStats {
                upserted: 3,
                deleted: 1,
                skipped: 1,
                failed: 0,
            }
        );

        let asha = index.get(&RecordKey::new(EntityType::Donor, "1")).unwrap().unwrap();
        assert!(asha.text.contains("Jaipur"));
        assert_eq!(asha.version, 2);
        assert!(index.get(&RecordKey::new(EntityType::Hospital, "7")).unwrap().is_none());

        assert!(worker.enqueue(RecordEvent::delete(EntityType::Donor, "1")).await.is_err());
    }

    #[tokio::test]
    async fn test_bulk_ingest_keeps_last_event_per_record() {
        let index = index();
        let events = vec![
            RecordEvent::upsert(EntityType::Donor, "1", fields(json!({"name": "Asha"}))),
            RecordEvent::upsert(EntityType::Donor, "2", fields(json!({"name": "Ravi"}))),
            RecordEvent::delete(EntityType::Donor, "2"),
            RecordEvent::upsert(EntityType::Hospital, "7", fields(json!({"location": "Udaipur"}))),
            RecordEvent::upsert(EntityType::Hospital, "8", fields(json!({"name": "City Hospital"}))),
        ];

        let progress = ProgressTracker::hidden();
        let stats = ingest_bulk(&index, events, &RetryPolicy::new(1, 1, 2), 2, &progress).await;

        assert_eq!(
            stats,
            IngestStats {
                upserted: 2,
                deleted: 1,
                skipped: 2,
                failed: 0,
            }
        );
        let live = index.stats().unwrap();
        assert_eq!(live.live(EntityType::Donor), 1);
        assert_eq!(live.live(EntityType::Hospital), 1);
    }

    #[test]
    fn test_lanes_are_stable() {
        let key = RecordKey::new(EntityType::Donor, "42");
        assert_eq!(lane_for(&key, 4), lane_for(&key.clone(), 4));
        assert_eq!(lane_for(&key, 1), 0);
    }
}
