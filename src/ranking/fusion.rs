// file: src/ranking/fusion.rs
// description: merges per-type candidate lists into one calibrated ranking
// reference: weighted cross-index score fusion

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use super::calibration::Calibration;
use crate::config::RankingConfig;
use crate::models::{Candidate, EntityType, EntityWeights, QueryFilters, SearchHit};

/// Candidates returned by one namespace search.
#[derive(Debug, Clone)]
pub struct TypeCandidates {
    pub entity_type: EntityType,
    pub candidates: Vec<Candidate>,
}

/// Pure, synchronous fusion step.
///
/// Filter, calibrate, weight, drop below the floor, merge, sort, truncate.
#[derive(Debug, Clone)]
pub struct FusionRanker {
    calibration: BTreeMap<EntityType, Calibration>,
    relevance_floor: f32,
}

impl FusionRanker {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            calibration: config.calibration.clone(),
            relevance_floor: config.relevance_floor,
        }
    }

    pub fn relevance_floor(&self) -> f32 {
        self.relevance_floor
    }

    pub fn fuse(
        &self,
        batches: Vec<TypeCandidates>,
        filters: &QueryFilters,
        weights: &EntityWeights,
        k: usize,
    ) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }

        let mut merged = Vec::new();

        for batch in batches {
            let entity_type = batch.entity_type;
            let fetched = batch.candidates.len();

            let survivors: Vec<Candidate> = batch
                .candidates
                .into_iter()
                .filter(|c| filters.admits(entity_type, &c.metadata))
                .collect();

            let raw: Vec<f32> = survivors.iter().map(|c| c.raw_score).collect();
            let calibrated = self
                .calibration
                .get(&entity_type)
                .copied()
                .unwrap_or_default()
                .apply(&raw);
            let weight = weights.get(entity_type);

            let before = merged.len();
            for (candidate, score) in survivors.into_iter().zip(calibrated) {
                let score = (score * weight).clamp(0.0, 1.0);
                if score < self.relevance_floor {
                    continue;
                }
                let metadata = (*candidate.metadata).clone();
                merged.push(SearchHit::new(candidate.key, metadata, score));
            }

            debug!(
                %entity_type,
                fetched,
                kept = merged.len() - before,
                "Fused candidates"
            );
        }

        merged.sort_by(compare_hits);
        merged.truncate(k);
        merged
    }
}

/// Score descending, then entity priority, then source id ascending.
pub fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.entity_type.priority().cmp(&b.entity_type.priority()))
        .then_with(|| a.source_id.cmp(&b.source_id))
}
