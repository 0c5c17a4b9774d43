// file: src/models/entity.rs
// description: closed set of searchable entity types and source identifiers
// reference: internal data structures

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

/// Record families the engine knows how to normalize and index.
///
/// Declaration order is the fusion tie-break priority: donors outrank
/// hospitals, hospitals outrank requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Donor,
    Hospital,
    Request,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Donor, EntityType::Hospital, EntityType::Request];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Donor => "donor",
            EntityType::Hospital => "hospital",
            EntityType::Request => "request",
        }
    }

    /// Lower value wins ties during fusion.
    pub fn priority(self) -> u8 {
        match self {
            EntityType::Donor => 0,
            EntityType::Hospital => 1,
            EntityType::Request => 2,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "donor" | "donors" => Ok(EntityType::Donor),
            "hospital" | "hospitals" => Ok(EntityType::Hospital),
            "request" | "requests" => Ok(EntityType::Request),
            other => Err(SearchError::Validation(format!(
                "Unknown entity type: {}",
                other
            ))),
        }
    }
}

/// Identifier of a row in the CRUD store.
///
/// Ordering is numeric when both sides are integers ("7" < "10") and
/// lexicographic otherwise, so tie-breaks read naturally for database keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // CRUD stores hand out integer primary keys; accept both shapes.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => SourceId::new(text),
            RawId::Number(number) => SourceId::from(number),
        })
    }
}

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Ord for SourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for SourceId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Unique key of a live record: one per `(entity_type, source_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub entity_type: EntityType,
    pub source_id: SourceId,
}

impl RecordKey {
    pub fn new(entity_type: EntityType, source_id: impl Into<SourceId>) -> Self {
        Self {
            entity_type,
            source_id: source_id.into(),
        }
    }

    /// Stable string id used by the persisted store.
    pub fn record_id(&self) -> String {
        format!("{}:{}", self.entity_type, self.source_id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.source_id)
    }
}
