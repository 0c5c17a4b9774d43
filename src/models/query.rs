// file: src/models/query.rs
// description: inbound query contract, structural filters and query plans
// reference: internal data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::EntityType;
use super::record::Metadata;

/// Body of the inbound search call: `{query, k?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: None,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Lt,
    Eq,
}

/// Numeric condition such as "older than 30" or "capacity above 100".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericFilter {
    pub op: Comparison,
    pub value: i64,
}

impl NumericFilter {
    pub fn new(op: Comparison, value: i64) -> Self {
        Self { op, value }
    }

    pub fn matches(&self, actual: f64) -> bool {
        let expected = self.value as f64;
        match self.op {
            Comparison::Gt => actual > expected,
            Comparison::Lt => actual < expected,
            Comparison::Eq => (actual - expected).abs() < f64::EPSILON,
        }
    }
}

/// Structural constraints extracted from the query text.
///
/// Filters are post-applied to candidate metadata. A filter only binds the
/// entity types that carry the corresponding field; see [`QueryFilters::admits`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub blood_group: Option<String>,
    pub city: Option<String>,
    pub age: Option<NumericFilter>,
    pub capacity: Option<NumericFilter>,
    pub status: Option<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.blood_group.is_none()
            && self.city.is_none()
            && self.age.is_none()
            && self.capacity.is_none()
            && self.status.is_none()
    }

    /// Whether a candidate of `entity_type` with `metadata` survives the filters.
    ///
    /// A record missing a field that applies to its type is dropped.
    pub fn admits(&self, entity_type: EntityType, metadata: &Metadata) -> bool {
        if let Some(wanted) = &self.blood_group {
            if matches!(entity_type, EntityType::Donor | EntityType::Request) {
                let found = text_field(metadata, "blood_group").map(|bg| canonical_blood_group(&bg));
                if found.as_deref() != Some(canonical_blood_group(wanted).as_str()) {
                    return false;
                }
            }
        }

        if let Some(wanted) = &self.city {
            let field = match entity_type {
                EntityType::Donor => Some("city"),
                EntityType::Hospital => Some("location"),
                EntityType::Request => None,
            };
            if let Some(field) = field {
                match text_field(metadata, field) {
                    Some(place) if place.eq_ignore_ascii_case(wanted.trim()) => {}
                    _ => return false,
                }
            }
        }

        if let Some(filter) = &self.age {
            let field = match entity_type {
                EntityType::Donor => "age",
                EntityType::Request => "patient_age",
                EntityType::Hospital => return false,
            };
            match number_field(metadata, field) {
                Some(age) if filter.matches(age) => {}
                _ => return false,
            }
        }

        if let Some(filter) = &self.capacity {
            if entity_type != EntityType::Hospital {
                return false;
            }
            match number_field(metadata, "capacity") {
                Some(capacity) if filter.matches(capacity) => {}
                _ => return false,
            }
        }

        if let Some(wanted) = &self.status {
            if entity_type != EntityType::Request {
                return false;
            }
            match text_field(metadata, "status") {
                Some(status) if status.eq_ignore_ascii_case(wanted) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Per-entity-type multipliers applied after calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityWeights(BTreeMap<EntityType, f32>);

impl EntityWeights {
    pub fn uniform() -> Self {
        Self(BTreeMap::new())
    }

    /// Intended type keeps full weight, every other type gets `off_intent`.
    pub fn favoring(intent: EntityType, off_intent: f32) -> Self {
        let weights = EntityType::ALL
            .into_iter()
            .map(|entity_type| {
                let weight = if entity_type == intent { 1.0 } else { off_intent };
                (entity_type, weight)
            })
            .collect();
        Self(weights)
    }

    pub fn get(&self, entity_type: EntityType) -> f32 {
        self.0.get(&entity_type).copied().unwrap_or(1.0)
    }

    pub fn is_uniform(&self) -> bool {
        self.0.values().all(|w| (*w - 1.0).abs() < f32::EPSILON)
    }
}

impl Default for EntityWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Everything the ranker needs to answer one query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub text: String,
    pub vector: Vec<f32>,
    pub filters: QueryFilters,
    pub weights: EntityWeights,
    pub intent: Option<EntityType>,
    pub k: usize,
}

/// Renders a metadata value as trimmed text; empty strings and nulls count as absent.
pub fn text_field(metadata: &Metadata, key: &str) -> Option<String> {
    match metadata.get(key)? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn number_field(metadata: &Metadata, key: &str) -> Option<f64> {
    match metadata.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn canonical_blood_group(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}
