// file: src/normalizer/rules.rs
// description: fixed per-entity field order used to render searchable text
// reference: record ingestion format of the CRUD backend

use crate::models::EntityType;

/// One rendered field: `"{label} {value}"`, or the bare value when the label is empty.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub key: &'static str,
    pub label: &'static str,
}

/// Rendering rule for one entity type.
///
/// Text is `"{prefix}: {primary}, {field}, {field}, ..."`. Field order is part
/// of the embedding contract and must not be reordered without re-ingesting.
#[derive(Debug)]
pub struct NormalizationRule {
    pub entity_type: EntityType,
    pub prefix: &'static str,
    pub primary: FieldRule,
    pub fields: &'static [FieldRule],
}

const fn field(key: &'static str, label: &'static str) -> FieldRule {
    FieldRule { key, label }
}

static DONOR: NormalizationRule = NormalizationRule {
    entity_type: EntityType::Donor,
    prefix: "Donor",
    primary: field("name", ""),
    fields: &[
        field("age", "Age"),
        field("blood_group", "Blood Group"),
        field("city", "City"),
        field("contact", "Contact"),
    ],
};

static HOSPITAL: NormalizationRule = NormalizationRule {
    entity_type: EntityType::Hospital,
    prefix: "Hospital",
    primary: field("name", ""),
    fields: &[
        field("location", "Location"),
        field("capacity", "Capacity"),
        field("contact", "Contact"),
    ],
};

static REQUEST: NormalizationRule = NormalizationRule {
    entity_type: EntityType::Request,
    prefix: "Request",
    primary: field("patient_name", "Patient"),
    fields: &[
        field("patient_age", "Age"),
        field("blood_group", "Blood Group"),
        field("units_requested", "Units"),
        field("hospital", "Hospital"),
        field("status", "Status"),
    ],
};

pub fn rule_for(entity_type: EntityType) -> &'static NormalizationRule {
    match entity_type {
        EntityType::Donor => &DONOR,
        EntityType::Hospital => &HOSPITAL,
        EntityType::Request => &REQUEST,
    }
}

impl FieldRule {
    pub fn render(&self, value: &str) -> String {
        if self.label.is_empty() {
            value.to_string()
        } else {
            format!("{} {}", self.label, value)
        }
    }
}
