// file: src/utils/validation.rs
// description: input validation for queries, record events and paths
// reference: input validation patterns

use std::path::Path;

use crate::config::RankingConfig;
use crate::error::{Result, SearchError};
use crate::models::RecordEvent;

/// Query text beyond this many characters is not embedded.
pub const MAX_QUERY_CHARS: usize = 1000;

pub struct Validator;

impl Validator {
    /// Resolves the requested result count: absent means `default_k`, anything
    /// above `max_k` is clamped. Zero stays zero.
    pub fn resolve_k(k: Option<usize>, ranking: &RankingConfig) -> usize {
        k.unwrap_or(ranking.default_k).min(ranking.max_k)
    }

    /// Trimmed query text, cut to [`MAX_QUERY_CHARS`] on a character boundary.
    pub fn query_text(query: &str) -> &str {
        let text = query.trim();
        match text.char_indices().nth(MAX_QUERY_CHARS) {
            Some((end, _)) => text[..end].trim_end(),
            None => text,
        }
    }

    pub fn validate_event(event: &RecordEvent) -> Result<()> {
        let key = event.key();
        if key.source_id.is_empty() {
            return Err(SearchError::Validation(format!(
                "{} event is missing source_id",
                key.entity_type
            )));
        }
        Ok(())
    }

    pub fn validate_file_path(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(SearchError::Validation(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        if !path.is_file() {
            return Err(SearchError::Validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SearchError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    /// Shortens text for log lines without splitting a character.
    pub fn truncate_text(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((end, _)) => format!("{}...", &text[..end]),
            None => text.to_string(),
        }
    }
}
