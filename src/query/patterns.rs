// file: src/query/patterns.rs
// description: compiled regex patterns for query filter extraction
// reference: https://docs.rs/regex

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::models::{Comparison, EntityType, NumericFilter};

lazy_static! {
    // Blood groups: compact "O+" / "ab-ve" forms, and spelled-out "O positive".
    // A lone lower-case "a" is not accepted in the spelled-out form.
    pub static ref BLOOD_GROUP_SYMBOL: Regex = Regex::new(
        r"(?i)\b(ab|a|b|o)(\+ve|-ve|\+|-)(?:[^a-z0-9]|$)"
    ).expect("BLOOD_GROUP_SYMBOL regex is valid");

    pub static ref BLOOD_GROUP_WORD: Regex = Regex::new(
        r"\b(AB|Ab|ab|A|B|b|O|o)\s+(?i:(positive|negative|pos|neg))\b"
    ).expect("BLOOD_GROUP_WORD regex is valid");

    // Capacity comparisons, matched and removed before age matching
    pub static ref CAPACITY_ABOVE: Regex = Regex::new(
        r"(?i)\bcapacity\b.*?\b(?:above|greater than|more than|over)\s*(\d+)"
    ).expect("CAPACITY_ABOVE regex is valid");

    pub static ref CAPACITY_BELOW: Regex = Regex::new(
        r"(?i)\bcapacity\b.*?\b(?:below|less than|under)\s*(\d+)"
    ).expect("CAPACITY_BELOW regex is valid");

    pub static ref CAPACITY_EQUAL: Regex = Regex::new(
        r"(?i)\bcapacity\s*(?:is|of|=|:)?\s*(\d+)"
    ).expect("CAPACITY_EQUAL regex is valid");

    // Quantities such as "over 2 units", removed before age matching
    pub static ref UNIT_QUANTITY: Regex = Regex::new(
        r"(?i)\b(?:(?:above|greater than|more than|over|below|less than|fewer than|under|at least)\s*)?\d+\s*(?:units?|bags?|pints?|beds?)\b"
    ).expect("UNIT_QUANTITY regex is valid");

    // Age comparisons
    pub static ref AGE_ABOVE: Regex = Regex::new(
        r"(?i)\b(?:above|older than|greater than|over)\s*(\d+)"
    ).expect("AGE_ABOVE regex is valid");

    pub static ref AGE_BELOW: Regex = Regex::new(
        r"(?i)\b(?:below|less than|under|younger than)\s*(\d+)"
    ).expect("AGE_BELOW regex is valid");

    pub static ref AGE_EQUAL: Regex = Regex::new(
        r"(?i)\b(?:age\s+is|aged|age)\s*(\d+)"
    ).expect("AGE_EQUAL regex is valid");

    pub static ref REQUEST_STATUS: Regex = Regex::new(
        r"(?i)\b(pending|approved|fulfilled|rejected)\b"
    ).expect("REQUEST_STATUS regex is valid");

    // Entity intent words
    pub static ref DONOR_INTENT: Regex = Regex::new(
        r"(?i)\bdonors?\b"
    ).expect("DONOR_INTENT regex is valid");

    pub static ref HOSPITAL_INTENT: Regex = Regex::new(
        r"(?i)\bhospitals?\b"
    ).expect("HOSPITAL_INTENT regex is valid");

    pub static ref REQUEST_INTENT: Regex = Regex::new(
        r"(?i)\b(?:requests?|patients?)\b"
    ).expect("REQUEST_INTENT regex is valid");
}

fn blood_group_from(captures: &Captures<'_>) -> Option<String> {
    let group = captures.get(1)?.as_str().to_ascii_uppercase();
    let sign = captures.get(2)?.as_str().to_ascii_lowercase();
    let sign = if sign.starts_with('+') || sign.starts_with('p') {
        '+'
    } else {
        '-'
    };
    Some(format!("{}{}", group, sign))
}

/// Every blood group mentioned in `text`, canonical (`O+`), in order of appearance.
pub fn blood_groups_in(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = BLOOD_GROUP_SYMBOL
        .captures_iter(text)
        .chain(BLOOD_GROUP_WORD.captures_iter(text))
        .filter_map(|captures| {
            let start = captures.get(0)?.start();
            blood_group_from(&captures).map(|group| (start, group))
        })
        .collect();
    found.sort_by_key(|(start, _)| *start);

    let mut groups: Vec<String> = Vec::new();
    for (_, group) in found {
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    groups
}

pub fn first_blood_group(text: &str) -> Option<String> {
    blood_groups_in(text).into_iter().next()
}

fn number(captures: &Captures<'_>) -> Option<i64> {
    captures.get(1)?.as_str().parse().ok()
}

/// Capacity filter plus the query text with the capacity phrase removed.
pub fn capacity_filter(text: &str) -> (Option<NumericFilter>, String) {
    let candidates = [
        (&*CAPACITY_ABOVE, Comparison::Gt),
        (&*CAPACITY_BELOW, Comparison::Lt),
        (&*CAPACITY_EQUAL, Comparison::Eq),
    ];

    for (pattern, op) in candidates {
        if let Some(captures) = pattern.captures(text) {
            if let Some(value) = number(&captures) {
                let stripped = pattern.replace(text, " ").into_owned();
                return (Some(NumericFilter::new(op, value)), stripped);
            }
        }
    }
    (None, text.to_string())
}

pub fn age_filter(text: &str) -> Option<NumericFilter> {
    let text = UNIT_QUANTITY.replace_all(text, " ");
    let text = text.as_ref();
    let candidates = [
        (&*AGE_ABOVE, Comparison::Gt),
        (&*AGE_BELOW, Comparison::Lt),
        (&*AGE_EQUAL, Comparison::Eq),
    ];

    candidates.into_iter().find_map(|(pattern, op)| {
        let captures = pattern.captures(text)?;
        number(&captures).map(|value| NumericFilter::new(op, value))
    })
}

pub fn request_status(text: &str) -> Option<String> {
    REQUEST_STATUS
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// The single entity type the query names, if exactly one is named.
pub fn entity_intent(text: &str) -> Option<EntityType> {
    let mentioned: Vec<EntityType> = [
        (&*DONOR_INTENT, EntityType::Donor),
        (&*HOSPITAL_INTENT, EntityType::Hospital),
        (&*REQUEST_INTENT, EntityType::Request),
    ]
    .into_iter()
    .filter(|(pattern, _)| pattern.is_match(text))
    .map(|(_, entity_type)| entity_type)
    .collect();

    match mentioned.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

/// Whole-word, case-insensitive containment of `phrase` in `text`.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let text = text.to_lowercase();
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return false;
    }

    text.match_indices(&phrase).any(|(start, matched)| {
        let end = start + matched.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
