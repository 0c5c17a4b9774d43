// file: src/models/search_result.rs
// description: Search result models with calibrated relevance scores
// reference: Used for vector similarity search results

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::entity::{EntityType, RecordKey, SourceId};
use super::record::Metadata;

/// Raw nearest-neighbor hit from one entity-type namespace.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: RecordKey,
    pub metadata: Arc<Metadata>,
    /// Cosine similarity in [-1, 1] as reported by the index
    pub raw_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Source fields, passed through verbatim
    pub metadata: Metadata,

    /// Calibrated relevance in [0, 1], comparable across entity types
    pub score: f32,

    /// Kept for deterministic tie-breaks; not part of the response body
    #[serde(skip)]
    pub source_id: SourceId,
}

impl SearchHit {
    pub fn new(key: RecordKey, metadata: Metadata, score: f32) -> Self {
        Self {
            entity_type: key.entity_type,
            metadata,
            score,
            source_id: key.source_id,
        }
    }

    /// Primary display name of the record.
    pub fn label(&self) -> String {
        let field = match self.entity_type {
            EntityType::Request => "patient_name",
            _ => "name",
        };
        super::query::text_field(&self.metadata, field)
            .unwrap_or_else(|| format!("{} {}", self.entity_type, self.source_id))
    }

    /// Format as a summary line for display
    pub fn format_summary(&self) -> String {
        let fields: Vec<String> = self
            .metadata
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{}={}", key, s),
                other => format!("{}={}", key, other),
            })
            .collect();

        format!(
            "Score: {:.4} | {} #{} | {}",
            self.score,
            self.entity_type,
            self.source_id,
            fields.join(", ")
        )
    }
}

/// Outbound contract: `{results: [{type, metadata, score}], ai_summary}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub ai_summary: String,
}

impl SearchResponse {
    pub fn empty(summary: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            ai_summary: summary.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn donor_hit() -> SearchHit {
        let metadata = json!({"name": "Asha", "blood_group": "O+", "city": "Udaipur"})
            .as_object()
            .cloned()
            .unwrap();
        SearchHit::new(RecordKey::new(EntityType::Donor, 1u64), metadata, 0.87)
    }

    #[test]
    fn test_hit_serializes_contract_fields_only() {
        let value = serde_json::to_value(donor_hit()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["type"], json!("donor"));
        assert_eq!(object["metadata"]["city"], json!("Udaipur"));
        assert!(object.get("source_id").is_none());
    }

    #[test]
    fn test_format_summary() {
        let summary = donor_hit().format_summary();
        assert!(summary.contains("0.8700"));
        assert!(summary.contains("donor #1"));
        assert!(summary.contains("city=Udaipur"));
    }

    #[test]
    fn test_label_falls_back_to_key() {
        let hit = SearchHit::new(RecordKey::new(EntityType::Request, 9u64), Metadata::new(), 0.5);
        assert_eq!(hit.label(), "request 9");
        assert_eq!(donor_hit().label(), "Asha");
    }
}
