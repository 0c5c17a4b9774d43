// file: src/index/hnsw.rs
// description: hierarchical navigable small world graph over cosine similarity
// reference: https://arxiv.org/abs/1603.09320

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use super::distance::{cosine_similarity, magnitude};
use crate::config::IndexConfig;
use crate::error::{Result, SearchError};

const MAX_LEVEL: u8 = 16;
const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl HnswParams {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            m: config.hnsw_m.max(2),
            ef_construction: config.ef_construction.max(1),
            ef_search: config.ef_search.max(1),
        }
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 100,
            ef_search: 64,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphNode {
    vector: Arc<[f32]>,
    magnitude: f32,
    neighbors: Vec<Vec<u32>>,
    deleted: bool,
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    score: f32,
    id: u32,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower id wins on equal score so traversal stays deterministic.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Append-only HNSW graph with soft deletes.
///
/// Node ids are dense slots. Deleted nodes keep their edges so the graph stays
/// navigable, but are never returned from [`HnswGraph::search`]. Small graphs
/// (no more nodes than the search beam) are scanned exactly.
#[derive(Debug, Clone)]
pub struct HnswGraph {
    params: HnswParams,
    m_max0: usize,
    level_mult: f64,
    dimension: usize,
    nodes: Vec<GraphNode>,
    entry_point: Option<u32>,
    level_max: u8,
    live: usize,
    rng_state: u64,
}

impl HnswGraph {
    pub fn new(params: HnswParams, dimension: usize) -> Self {
        Self {
            params,
            m_max0: params.m * 2,
            level_mult: 1.0 / (params.m as f64).ln(),
            dimension,
            nodes: Vec::new(),
            entry_point: None,
            level_max: 0,
            live: 0,
            rng_state: 42,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Total node slots, including tombstones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn live_len(&self) -> usize {
        self.live
    }

    pub fn tombstones(&self) -> usize {
        self.nodes.len() - self.live
    }

    /// True once deleted nodes outnumber live ones.
    pub fn needs_compaction(&self) -> bool {
        self.tombstones() > self.live
    }

    pub fn is_deleted(&self, id: u32) -> bool {
        self.nodes.get(id as usize).is_none_or(|node| node.deleted)
    }

    pub fn vector(&self, id: u32) -> Option<&Arc<[f32]>> {
        self.nodes.get(id as usize).map(|node| &node.vector)
    }

    pub fn insert(&mut self, vector: Arc<[f32]>) -> Result<u32> {
        if vector.len() != self.dimension {
            return Err(SearchError::EmbeddingService(format!(
                "index expects {} dimensions, got {}",
                self.dimension,
                vector.len()
            )));
        }

        let id = u32::try_from(self.nodes.len())
            .map_err(|_| SearchError::IndexUnavailable("namespace is full".to_string()))?;
        let level = self.select_level();
        let mag = magnitude(&vector);

        self.nodes.push(GraphNode {
            vector: Arc::clone(&vector),
            magnitude: mag,
            neighbors: vec![Vec::new(); level as usize + 1],
            deleted: false,
        });
        self.live += 1;

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.level_max = level;
            return Ok(id);
        };

        // Greedy descent through the layers above the new node.
        let mut layer = self.level_max;
        while layer > level {
            entry = self.greedy_closest(entry, &vector, mag, layer);
            layer -= 1;
        }

        for layer in (0..=level.min(self.level_max)).rev() {
            let found = self.search_layer(entry, &vector, mag, self.params.ef_construction, layer);
            let limit = if layer == 0 { self.m_max0 } else { self.params.m };

            let selected: Vec<u32> = found
                .iter()
                .filter(|s| s.id != id)
                .take(self.params.m)
                .map(|s| s.id)
                .collect();

            for &neighbor in &selected {
                self.link(neighbor, id, layer);
                self.link(id, neighbor, layer);
            }
            for &neighbor in &selected {
                self.prune(neighbor, layer, limit);
            }

            if let Some(best) = found.first() {
                entry = best.id;
            }
        }

        if level > self.level_max {
            self.entry_point = Some(id);
            self.level_max = level;
        }

        Ok(id)
    }

    /// Soft-deletes a node. Returns false when it was absent or already deleted.
    pub fn mark_deleted(&mut self, id: u32) -> bool {
        match self.nodes.get_mut(id as usize) {
            Some(node) if !node.deleted => {
                node.deleted = true;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Up to `k` live nodes by descending cosine similarity.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u32, f32)> {
        if k == 0 || self.live == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let query_mag = magnitude(query);
        let ef = self.params.ef_search.max(k);

        let mut hits: Vec<Scored> = if self.nodes.len() <= ef {
            self.nodes
                .iter()
                .enumerate()
                .filter(|(_, node)| !node.deleted)
                .map(|(id, node)| Scored {
                    score: cosine_similarity(&node.vector, query, node.magnitude, query_mag),
                    id: id as u32,
                })
                .collect()
        } else {
            let Some(mut entry) = self.entry_point else {
                return Vec::new();
            };
            let mut layer = self.level_max;
            while layer > 0 {
                entry = self.greedy_closest(entry, query, query_mag, layer);
                layer -= 1;
            }
            // Tombstones occupy beam slots, so widen the beam by their count.
            let beam = ef.saturating_add(self.tombstones().min(ef));
            self.search_layer(entry, query, query_mag, beam, 0)
                .into_iter()
                .filter(|s| !self.is_deleted(s.id))
                .collect()
        };

        hits.sort_by(|a, b| b.cmp(a));
        hits.truncate(k);
        hits.into_iter().map(|s| (s.id, s.score)).collect()
    }

    /// Rebuilds the graph from live nodes only. Returns the new graph and the
    /// old-id to new-id mapping.
    pub fn compact(&self) -> Result<(HnswGraph, Vec<Option<u32>>)> {
        let mut rebuilt = HnswGraph::new(self.params, self.dimension);
        let mut mapping = vec![None; self.nodes.len()];

        for (old_id, node) in self.nodes.iter().enumerate() {
            if node.deleted {
                continue;
            }
            mapping[old_id] = Some(rebuilt.insert(Arc::clone(&node.vector))?);
        }

        Ok((rebuilt, mapping))
    }

    fn select_level(&mut self) -> u8 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        let r = ((self.rng_state >> 33) as f64 / (1u64 << 31) as f64).max(1e-9);
        let level = (-r.ln() * self.level_mult).floor();
        (level as u32).min(MAX_LEVEL as u32) as u8
    }

    fn similarity(&self, id: u32, query: &[f32], query_mag: f32) -> f32 {
        match self.nodes.get(id as usize) {
            Some(node) => cosine_similarity(&node.vector, query, node.magnitude, query_mag),
            None => f32::NEG_INFINITY,
        }
    }

    fn neighbors(&self, id: u32, layer: u8) -> &[u32] {
        self.nodes
            .get(id as usize)
            .and_then(|node| node.neighbors.get(layer as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn greedy_closest(&self, entry: u32, query: &[f32], query_mag: f32, layer: u8) -> u32 {
        let mut current = entry;
        let mut current_sim = self.similarity(current, query, query_mag);

        loop {
            let mut changed = false;
            for &neighbor in self.neighbors(current, layer) {
                let sim = self.similarity(neighbor, query, query_mag);
                if sim > current_sim {
                    current = neighbor;
                    current_sim = sim;
                    changed = true;
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Beam search on one layer; results sorted by descending similarity.
    fn search_layer(&self, entry: u32, query: &[f32], query_mag: f32, ef: usize, layer: u8) -> Vec<Scored> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut candidates: BinaryHeap<Scored> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();

        let start = Scored {
            score: self.similarity(entry, query, query_mag),
            id: entry,
        };
        visited.insert(entry);
        candidates.push(start);
        results.push(Reverse(start));

        while let Some(current) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
            if current.score < worst && results.len() >= ef {
                break;
            }

            for &neighbor in self.neighbors(current.id, layer) {
                if !visited.insert(neighbor) {
                    continue;
                }

                let scored = Scored {
                    score: self.similarity(neighbor, query, query_mag),
                    id: neighbor,
                };
                let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
                if scored.score > worst || results.len() < ef {
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<Scored> = results.into_iter().map(|r| r.0).collect();
        found.sort_by(|a, b| b.cmp(a));
        found
    }

    fn link(&mut self, from: u32, to: u32, layer: u8) {
        if let Some(node) = self.nodes.get_mut(from as usize) {
            while node.neighbors.len() <= layer as usize {
                node.neighbors.push(Vec::new());
            }
            let edges = &mut node.neighbors[layer as usize];
            if !edges.contains(&to) {
                edges.push(to);
            }
        }
    }

    fn prune(&mut self, id: u32, layer: u8, limit: usize) {
        let Some(node) = self.nodes.get(id as usize) else {
            return;
        };
        let Some(edges) = node.neighbors.get(layer as usize) else {
            return;
        };
        if edges.len() <= limit {
            return;
        }

        let vector = Arc::clone(&node.vector);
        let mag = node.magnitude;
        let mut scored: Vec<Scored> = edges
            .iter()
            .map(|&neighbor| Scored {
                score: self.similarity(neighbor, &vector, mag),
                id: neighbor,
            })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.truncate(limit);

        if let Some(node) = self.nodes.get_mut(id as usize) {
            node.neighbors[layer as usize] = scored.into_iter().map(|s| s.id).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dimension: usize, seed: u64) -> Arc<[f32]> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        let raw: Vec<f32> = (0..dimension)
            .map(|_| {
                state = state.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT);
                ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
            })
            .collect();
        let norm = magnitude(&raw);
        raw.iter().map(|v| v / norm).collect::<Vec<f32>>().into()
    }

    fn small_params() -> HnswParams {
        HnswParams {
            m: 8,
            ef_construction: 64,
            ef_search: 64,
        }
    }

    #[test]
    fn test_exact_match_is_first() {
        let mut graph = HnswGraph::new(small_params(), 16);
        let vectors: Vec<Arc<[f32]>> = (0..200).map(|i| unit(16, i)).collect();
        for v in &vectors {
            graph.insert(Arc::clone(v)).unwrap();
        }

        for probe in [0usize, 57, 199] {
            let hits = graph.search(&vectors[probe], 5);
            assert_eq!(hits.len(), 5);
            assert_eq!(hits[0].0, probe as u32);
            assert!((hits[0].1 - 1.0).abs() < 1e-5);
            assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
        }
    }

    #[test]
    fn test_fewer_than_k_live_entries() {
        let mut graph = HnswGraph::new(small_params(), 8);
        graph.insert(unit(8, 1)).unwrap();
        graph.insert(unit(8, 2)).unwrap();
        assert_eq!(graph.search(&unit(8, 3), 10).len(), 2);
        assert!(HnswGraph::new(small_params(), 8).search(&unit(8, 3), 10).is_empty());
    }

    #[test]
    fn test_deleted_nodes_are_never_returned() {
        let mut graph = HnswGraph::new(small_params(), 16);
        let vectors: Vec<Arc<[f32]>> = (0..100).map(|i| unit(16, i)).collect();
        for v in &vectors {
            graph.insert(Arc::clone(v)).unwrap();
        }

        assert!(graph.mark_deleted(10));
        assert!(!graph.mark_deleted(10));
        assert_eq!(graph.live_len(), 99);

        let hits = graph.search(&vectors[10], 20);
        assert!(hits.iter().all(|(id, _)| *id != 10));
    }

    #[test]
    fn test_compaction_drops_tombstones() {
        let mut graph = HnswGraph::new(small_params(), 8);
        for i in 0..10 {
            graph.insert(unit(8, i)).unwrap();
        }
        for id in 0..6 {
            graph.mark_deleted(id);
        }
        assert!(graph.needs_compaction());

        let (rebuilt, mapping) = graph.compact().unwrap();
        assert_eq!(rebuilt.len(), 4);
        assert_eq!(rebuilt.tombstones(), 0);
        assert_eq!(mapping[0], None);
        assert_eq!(mapping[6], Some(0));
        assert_eq!(mapping[9], Some(3));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut graph = HnswGraph::new(small_params(), 8);
        assert!(graph.insert(unit(4, 1)).is_err());
        assert!(graph.search(&[0.5; 4], 3).is_empty());
    }

    #[test]
    fn test_level_distribution() {
        let mut graph = HnswGraph::new(HnswParams::default(), 4);
        let mut levels = [0u32; MAX_LEVEL as usize + 1];
        for _ in 0..10_000 {
            levels[graph.select_level() as usize] += 1;
        }
        assert!(levels[0] > 5000);
        assert!(levels[0] > levels[1]);
    }
}
