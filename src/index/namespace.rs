// file: src/index/namespace.rs
// description: immutable per-entity-type index snapshot
// reference: copy-on-write snapshots swapped behind a lock

use std::collections::HashMap;
use std::sync::Arc;

use super::hnsw::{HnswGraph, HnswParams};
use crate::error::Result;
use crate::models::query::text_field;
use crate::models::{Candidate, EntityType, IndexedRecord, Metadata, SourceId};

#[derive(Debug, Clone)]
struct LiveEntry {
    record: Arc<IndexedRecord>,
    node: u32,
}

/// One entity type's records plus the graph over their embeddings.
///
/// Snapshots are never mutated once published; writers clone, apply and swap.
#[derive(Debug, Clone)]
pub struct NamespaceSnapshot {
    entity_type: EntityType,
    graph: HnswGraph,
    entries: HashMap<SourceId, LiveEntry>,
    owners: Vec<Option<SourceId>>,
    places: Arc<Vec<String>>,
}

impl NamespaceSnapshot {
    pub fn new(entity_type: EntityType, params: HnswParams, dimension: usize) -> Self {
        Self {
            entity_type,
            graph: HnswGraph::new(params, dimension),
            entries: HashMap::new(),
            owners: Vec::new(),
            places: Arc::new(Vec::new()),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn get(&self, source_id: &SourceId) -> Option<&Arc<IndexedRecord>> {
        self.entries.get(source_id).map(|entry| &entry.record)
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<IndexedRecord>> {
        self.entries.values().map(|entry| &entry.record)
    }

    pub fn live_len(&self) -> usize {
        self.entries.len()
    }

    pub fn tombstones(&self) -> usize {
        self.graph.tombstones()
    }

    pub fn places(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.places)
    }

    /// Inserts a freshly embedded record, retiring any previous graph node.
    pub fn apply_upsert(&mut self, record: IndexedRecord) -> Result<()> {
        let source_id = record.key.source_id.clone();

        if let Some(previous) = self.entries.get(&source_id) {
            if previous.record.version == record.version && previous.record.text == record.text {
                // Same embedding; only the envelope moved
                let node = previous.node;
                self.entries.insert(
                    source_id,
                    LiveEntry {
                        record: Arc::new(record),
                        node,
                    },
                );
                return Ok(());
            }
            let stale = previous.node;
            self.retire(stale);
        }

        let node = self.graph.insert(Arc::clone(&record.embedding))?;
        debug_assert_eq!(node as usize, self.owners.len());
        self.owners.push(Some(source_id.clone()));
        self.entries.insert(
            source_id,
            LiveEntry {
                record: Arc::new(record),
                node,
            },
        );
        Ok(())
    }

    /// Replaces metadata without touching the embedding or version and
    /// returns the updated record.
    pub fn apply_metadata(
        &mut self,
        source_id: &SourceId,
        metadata: Metadata,
        updated_at: u64,
    ) -> Option<IndexedRecord> {
        let entry = self.entries.get_mut(source_id)?;
        let mut record = IndexedRecord::clone(&entry.record);
        record.metadata = Arc::new(metadata);
        record.updated_at = updated_at;
        entry.record = Arc::new(record.clone());
        Some(record)
    }

    pub fn apply_delete(&mut self, source_id: &SourceId) -> bool {
        match self.entries.remove(source_id) {
            Some(entry) => {
                self.retire(entry.node);
                true
            }
            None => false,
        }
    }

    /// Compacts when needed and recomputes derived data. Call once per write batch.
    pub fn finish_write(&mut self) -> Result<()> {
        if self.graph.needs_compaction() {
            self.compact()?;
        }
        self.places = Arc::new(self.collect_places());
        Ok(())
    }

    /// Up to `k` live candidates ordered by descending cosine similarity.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Candidate> {
        self.graph
            .search(query, k)
            .into_iter()
            .filter_map(|(node, score)| {
                let owner = self.owners.get(node as usize)?.as_ref()?;
                let entry = self.entries.get(owner)?;
                // A node that no longer backs its owner is stale
                (entry.node == node).then(|| Candidate {
                    key: entry.record.key.clone(),
                    metadata: Arc::clone(&entry.record.metadata),
                    raw_score: score,
                })
            })
            .collect()
    }

    fn retire(&mut self, node: u32) {
        self.graph.mark_deleted(node);
        if let Some(owner) = self.owners.get_mut(node as usize) {
            *owner = None;
        }
    }

    fn compact(&mut self) -> Result<()> {
        let (graph, mapping) = self.graph.compact()?;
        let mut owners = vec![None; graph.len()];

        for (source_id, entry) in self.entries.iter_mut() {
            if let Some(Some(node)) = mapping.get(entry.node as usize) {
                entry.node = *node;
                owners[*node as usize] = Some(source_id.clone());
            }
        }

        self.graph = graph;
        self.owners = owners;
        Ok(())
    }

    fn collect_places(&self) -> Vec<String> {
        let field = match self.entity_type {
            EntityType::Donor => "city",
            EntityType::Hospital => "location",
            EntityType::Request => return Vec::new(),
        };

        let mut places: Vec<String> = self
            .entries
            .values()
            .filter_map(|entry| text_field(&entry.record.metadata, field))
            .collect();
        places.sort();
        places.dedup();
        places
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordKey;
    use serde_json::json;

    fn record(id: &str, text: &str, city: &str, embedding: Vec<f32>, version: u64) -> IndexedRecord {
        IndexedRecord {
            key: RecordKey::new(EntityType::Donor, id),
            text: text.to_string(),
            metadata: Arc::new(json!({"name": text, "city": city}).as_object().cloned().unwrap()),
            embedding: Arc::from(embedding),
            version,
            updated_at: 0,
        }
    }

    fn snapshot() -> NamespaceSnapshot {
        NamespaceSnapshot::new(EntityType::Donor, HnswParams::default(), 3)
    }

    #[test]
    fn test_reembedding_retires_old_node() {
        let mut ns = snapshot();
        ns.apply_upsert(record("1", "Asha", "Udaipur", vec![1.0, 0.0, 0.0], 1)).unwrap();
        ns.apply_upsert(record("1", "Asha K", "Udaipur", vec![0.0, 1.0, 0.0], 2)).unwrap();
        ns.finish_write().unwrap();

        assert_eq!(ns.live_len(), 1);
        let hits = ns.search(&[1.0, 0.0, 0.0], 5);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].raw_score.abs() < 1e-6);
        assert_eq!(ns.get(&SourceId::from("1")).unwrap().version, 2);
    }

    #[test]
    fn test_delete_and_places() {
        let mut ns = snapshot();
        ns.apply_upsert(record("1", "Asha", "Udaipur", vec![1.0, 0.0, 0.0], 1)).unwrap();
        ns.apply_upsert(record("2", "Ravi", "Jaipur", vec![0.0, 1.0, 0.0], 1)).unwrap();
        ns.finish_write().unwrap();
        assert_eq!(ns.places().as_slice(), &["Jaipur".to_string(), "Udaipur".to_string()]);

        assert!(ns.apply_delete(&SourceId::from("2")));
        assert!(!ns.apply_delete(&SourceId::from("2")));
        ns.finish_write().unwrap();

        let hits = ns.search(&[0.0, 1.0, 0.0], 5);
        assert!(hits.iter().all(|c| c.key.source_id.as_str() == "1"));
        assert_eq!(ns.places().as_slice(), &["Udaipur".to_string()]);
    }

    #[test]
    fn test_compaction_keeps_live_records_searchable() {
        let mut ns = snapshot();
        for i in 0..6 {
            let v = vec![1.0, i as f32, 0.5];
            ns.apply_upsert(record(&i.to_string(), "donor", "Udaipur", v, 1)).unwrap();
        }
        for i in 0..4 {
            ns.apply_delete(&SourceId::from(i.to_string().as_str()));
        }
        ns.finish_write().unwrap();

        assert_eq!(ns.tombstones(), 0);
        let mut ids: Vec<String> = ns
            .search(&[1.0, 5.0, 0.5], 10)
            .into_iter()
            .map(|c| c.key.source_id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["4", "5"]);
    }

    #[test]
    fn test_metadata_only_update_keeps_node() {
        let mut ns = snapshot();
        ns.apply_upsert(record("1", "Asha", "Udaipur", vec![1.0, 0.0, 0.0], 1)).unwrap();
        let metadata = json!({"name": "Asha", "city": "Ajmer"}).as_object().cloned().unwrap();
        let updated = ns.apply_metadata(&SourceId::from("1"), metadata, 5).unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.updated_at, 5);
        assert!(ns.apply_metadata(&SourceId::from("9"), Metadata::new(), 5).is_none());
        ns.finish_write().unwrap();

        assert_eq!(ns.tombstones(), 0);
        let hits = ns.search(&[1.0, 0.0, 0.0], 1);
        assert_eq!(hits[0].metadata.get("city"), Some(&json!("Ajmer")));
    }
}
