// file: src/normalizer/mod.rs
// description: converts CRUD entities into embeddable text plus a metadata envelope
// reference: record ingestion format of the CRUD backend

pub mod rules;

pub use rules::{FieldRule, NormalizationRule, rule_for};

use tracing::warn;

use crate::error::{Result, SearchError};
use crate::models::query::text_field;
use crate::models::{EntityType, Metadata, NormalizedRecord, RecordKey, SourceId};

/// Pure mapping from `(entity_type, source_id, fields)` to a [`NormalizedRecord`].
///
/// Same input always yields identical text and metadata, which keeps
/// re-embedding idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        entity_type: EntityType,
        source_id: &SourceId,
        fields: &Metadata,
    ) -> Result<NormalizedRecord> {
        if source_id.is_empty() {
            return Err(SearchError::normalization(
                entity_type,
                None,
                "source id is required",
            ));
        }

        let rule = rule_for(entity_type);
        let primary = text_field(fields, rule.primary.key).ok_or_else(|| {
            SearchError::normalization(
                entity_type,
                Some(source_id.as_str()),
                format!("{} is required", rule.primary.key),
            )
        })?;

        let mut parts = Vec::with_capacity(rule.fields.len() + 1);
        parts.push(rule.primary.render(&primary));
        parts.extend(
            rule.fields
                .iter()
                .filter_map(|field| text_field(fields, field.key).map(|value| field.render(&value))),
        );

        Ok(NormalizedRecord {
            key: RecordKey::new(entity_type, source_id.clone()),
            text: format!("{}: {}", rule.prefix, parts.join(", ")),
            metadata: fields.clone(),
        })
    }

    /// Normalizes a batch, logging and skipping records that fail.
    pub fn normalize_batch<'a, I>(&self, items: I) -> (Vec<NormalizedRecord>, Vec<SearchError>)
    where
        I: IntoIterator<Item = (EntityType, &'a SourceId, &'a Metadata)>,
    {
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for (entity_type, source_id, fields) in items {
            match self.normalize(entity_type, source_id, fields) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(%entity_type, source_id = %source_id, error = %e, "Skipping record");
                    failures.push(e);
                }
            }
        }

        (records, failures)
    }
}
