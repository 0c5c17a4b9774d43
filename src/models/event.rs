// file: src/models/event.rs
// description: change events emitted by the CRUD store for indexing
// reference: record source collaborator contract

use serde::{Deserialize, Serialize};

use super::entity::{EntityType, RecordKey, SourceId};
use super::record::Metadata;

/// A create/update or delete notification for one source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RecordEvent {
    Upsert {
        entity_type: EntityType,
        source_id: SourceId,
        #[serde(default)]
        fields: Metadata,
    },
    Delete {
        entity_type: EntityType,
        source_id: SourceId,
    },
}

impl RecordEvent {
    pub fn upsert(entity_type: EntityType, source_id: impl Into<SourceId>, fields: Metadata) -> Self {
        Self::Upsert {
            entity_type,
            source_id: source_id.into(),
            fields,
        }
    }

    pub fn delete(entity_type: EntityType, source_id: impl Into<SourceId>) -> Self {
        Self::Delete {
            entity_type,
            source_id: source_id.into(),
        }
    }

    pub fn key(&self) -> RecordKey {
        match self {
            Self::Upsert {
                entity_type,
                source_id,
                ..
            }
            | Self::Delete {
                entity_type,
                source_id,
            } => RecordKey::new(*entity_type, source_id.clone()),
        }
    }

    /// Parses either a JSON array of events or one event per line.
    pub fn parse_batch(input: &str) -> serde_json::Result<Vec<RecordEvent>> {
        let trimmed = input.trim_start();
        if trimmed.starts_with('[') {
            return serde_json::from_str(trimmed);
        }

        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tagged_events() {
        let input = r#"[
            {"op": "upsert", "entity_type": "donor", "source_id": "1", "fields": {"name": "Asha"}},
            {"op": "delete", "entity_type": "hospital", "source_id": "7"}
        ]"#;

        let events = RecordEvent::parse_batch(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], RecordEvent::delete(EntityType::Hospital, "7"));
        assert_eq!(events[0].key().record_id(), "donor:1");
    }

    #[test]
    fn test_parse_json_lines() {
        let input = "{\"op\":\"delete\",\"entity_type\":\"request\",\"source_id\":\"3\"}\n\n{\"op\":\"upsert\",\"entity_type\":\"donor\",\"source_id\":\"4\"}\n";
        let events = RecordEvent::parse_batch(input).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            RecordEvent::Upsert { fields, .. } => assert!(fields.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
