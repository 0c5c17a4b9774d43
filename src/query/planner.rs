// file: src/query/planner.rs
// description: turns raw query text into a query vector plus structural filters
// reference: best-effort vocabulary extraction over free text

use tracing::debug;

use super::patterns::{
    age_filter, capacity_filter, contains_phrase, entity_intent, first_blood_group, request_status,
};
use crate::config::{PlannerConfig, RankingConfig};
use crate::embedding::{EmbeddingService, ensure_dimension};
use crate::error::Result;
use crate::models::{EntityType, EntityWeights, QueryFilters, QueryPlan};

/// Filters and intent found in a query, before embedding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryAnalysis {
    pub filters: QueryFilters,
    pub intent: Option<EntityType>,
}

pub struct QueryPlanner {
    domain_guard: bool,
    domain_keywords: Vec<String>,
    extra_places: Vec<String>,
    off_intent_weight: f32,
}

impl QueryPlanner {
    pub fn new(planner: &PlannerConfig, ranking: &RankingConfig) -> Self {
        Self {
            domain_guard: planner.domain_guard,
            domain_keywords: planner
                .domain_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            extra_places: planner.extra_places.clone(),
            off_intent_weight: ranking.off_intent_weight,
        }
    }

    /// False only when the domain guard is on and no keyword appears in `text`.
    pub fn in_domain(&self, text: &str) -> bool {
        if !self.domain_guard {
            return true;
        }
        let lowered = text.to_lowercase();
        self.domain_keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// Extracts filters and intent. Never fails; unknown text yields empty filters.
    pub fn analyze(&self, text: &str, known_places: &[String]) -> QueryAnalysis {
        let (capacity, remainder) = capacity_filter(text);

        let filters = QueryFilters {
            blood_group: first_blood_group(text),
            city: self.match_place(text, known_places),
            age: age_filter(&remainder),
            capacity,
            status: request_status(text),
        };

        QueryAnalysis {
            filters,
            intent: entity_intent(text),
        }
    }

    pub fn weights(&self, intent: Option<EntityType>) -> EntityWeights {
        match intent {
            Some(entity_type) => EntityWeights::favoring(entity_type, self.off_intent_weight),
            None => EntityWeights::uniform(),
        }
    }

    /// Embeds the literal query text and attaches the extracted filters.
    pub async fn plan(
        &self,
        text: &str,
        k: usize,
        embedder: &dyn EmbeddingService,
        known_places: &[String],
    ) -> Result<QueryPlan> {
        let text = text.trim();
        let vector = embedder.embed(text).await?;
        let vector = ensure_dimension(vector, embedder.dimension())?;
        let analysis = self.analyze(text, known_places);

        debug!(
            filters = ?analysis.filters,
            intent = ?analysis.intent,
            "Planned query"
        );

        Ok(QueryPlan {
            text: text.to_string(),
            vector,
            weights: self.weights(analysis.intent),
            filters: analysis.filters,
            intent: analysis.intent,
            k,
        })
    }

    fn match_place(&self, text: &str, known_places: &[String]) -> Option<String> {
        let mut places: Vec<&str> = known_places
            .iter()
            .chain(self.extra_places.iter())
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        // Longest first so "New Delhi" wins over "Delhi"
        places.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        places.dedup();

        places
            .into_iter()
            .find(|place| contains_phrase(text, place))
            .map(str::to_string)
    }
}
