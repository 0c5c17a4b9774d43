// file: src/summary/context.rs
// description: bounded, deterministic summary context built from result metadata
// reference: internal data structures

use serde_json::Value;

use crate::models::query::{canonical_blood_group, text_field};
use crate::models::{EntityType, SearchHit};

/// The facts a summary may draw on, rendered from the top-ranked results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryContext {
    /// One `[i] type: key=value, ...` line per included record
    pub lines: Vec<String>,
    /// Size of the whole result set, not just the included lines
    pub total_results: usize,
    pub top_label: Option<String>,
    pub places: Vec<String>,
    pub blood_groups: Vec<String>,
}

impl SummaryContext {
    /// Takes results in ranking order and keeps whole lines within both caps.
    ///
    /// The first line is always kept so a non-empty result set never yields an
    /// empty context.
    pub fn build(hits: &[SearchHit], max_records: usize, max_chars: usize) -> Self {
        let mut context = Self {
            total_results: hits.len(),
            top_label: hits.first().map(describe),
            ..Self::default()
        };

        let mut used = 0usize;
        for (i, hit) in hits.iter().take(max_records.max(1)).enumerate() {
            let line = render_line(i + 1, hit);
            let cost = line.chars().count() + usize::from(!context.lines.is_empty());
            if !context.lines.is_empty() && used + cost > max_chars {
                break;
            }
            used += cost;

            for field in ["city", "location"] {
                if let Some(place) = text_field(&hit.metadata, field) {
                    push_unique(&mut context.places, place);
                }
            }
            if let Some(group) = text_field(&hit.metadata, "blood_group") {
                push_unique(&mut context.blood_groups, canonical_blood_group(&group));
            }
            context.lines.push(line);
        }

        context
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn included(&self) -> usize {
        self.lines.len()
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn render_line(position: usize, hit: &SearchHit) -> String {
    let fields: Vec<String> = hit
        .metadata
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| format!("{}={}", key, render_value(value)))
        .collect();
    format!("[{}] {}: {}", position, hit.entity_type, fields.join(", "))
}

/// Short description of one record: its name followed by its key facts.
pub fn describe(hit: &SearchHit) -> String {
    let facts: &[(&str, &str)] = match hit.entity_type {
        EntityType::Donor => &[
            ("age", "Age"),
            ("blood_group", "Blood Group"),
            ("contact", "Contact"),
            ("city", "City"),
        ],
        EntityType::Hospital => &[("location", "Location"), ("capacity", "Capacity")],
        EntityType::Request => &[
            ("patient_age", "Age"),
            ("blood_group", "Blood Group"),
            ("units_requested", "Units"),
            ("status", "Status"),
        ],
    };

    let parts: Vec<String> = facts
        .iter()
        .filter_map(|(key, label)| {
            text_field(&hit.metadata, key).map(|value| format!("{} {}", label, value))
        })
        .collect();

    if parts.is_empty() {
        hit.label()
    } else {
        format!("{} ({})", hit.label(), parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordKey;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn hit(entity_type: EntityType, id: u64, fields: Value, score: f32) -> SearchHit {
        SearchHit::new(
            RecordKey::new(entity_type, id),
            fields.as_object().cloned().unwrap(),
            score,
        )
    }

    fn sample() -> Vec<SearchHit> {
        vec![
            hit(
                EntityType::Donor,
                1,
                json!({"name": "Asha", "age": 29, "blood_group": "o+", "city": "Udaipur", "contact": null}),
                0.9,
            ),
            hit(
                EntityType::Hospital,
                7,
                json!({"name": "City Hospital", "location": "Udaipur", "capacity": 50}),
                0.6,
            ),
        ]
    }

    #[test]
    fn test_lines_follow_metadata_order() {
        let context = SummaryContext::build(&sample(), 5, 2000);
        assert_eq!(
            context.lines,
            vec![
                "[1] donor: name=Asha, age=29, blood_group=o+, city=Udaipur",
                "[2] hospital: name=City Hospital, location=Udaipur, capacity=50",
            ]
        );
        assert_eq!(context.places, vec!["Udaipur"]);
        assert_eq!(context.blood_groups, vec!["O+"]);
        assert_eq!(
            context.top_label.as_deref(),
            Some("Asha (Age 29, Blood Group o+, City Udaipur)")
        );
    }

    #[test]
    fn test_caps_keep_top_whole_lines() {
        let by_records = SummaryContext::build(&sample(), 1, 2000);
        assert_eq!(by_records.included(), 1);
        assert_eq!(by_records.total_results, 2);
        assert_eq!(by_records.places, vec!["Udaipur"]);

        let by_chars = SummaryContext::build(&sample(), 5, 60);
        assert_eq!(by_chars.included(), 1);
        assert!(by_chars.render().starts_with("[1] donor"));

        let tiny = SummaryContext::build(&sample(), 5, 1);
        assert_eq!(tiny.included(), 1);
    }

    #[test]
    fn test_describe_request() {
        let request = hit(
            EntityType::Request,
            3,
            json!({"patient_name": "Ravi", "patient_age": 40, "blood_group": "B-", "units_requested": 2, "status": "pending"}),
            0.5,
        );
        assert_eq!(
            describe(&request),
            "Ravi (Age 40, Blood Group B-, Units 2, Status pending)"
        );
    }
}
