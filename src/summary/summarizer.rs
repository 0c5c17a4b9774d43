// file: src/summary/summarizer.rs
// description: bounded, grounded summarization with deterministic fallback
// reference: https://docs.rs/tokio/latest/tokio/time/fn.timeout.html

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::context::SummaryContext;
use super::generator::GenerativeService;
use crate::config::{GenerationConfig, SummaryConfig};
use crate::error::{Result, SearchError};
use crate::models::SearchHit;
use crate::query::patterns::{blood_groups_in, contains_phrase};

pub const NO_MATCHES: &str = "no matching records";

pub const OUT_OF_DOMAIN: &str = "This system only supports blood bank related queries about donors, hospitals, and blood requests.";

/// Summary used whenever generation fails, times out or is ungrounded.
pub fn fallback_summary(count: usize) -> String {
    format!("Found {} records matching your query", count)
}

pub struct Summarizer {
    generator: Arc<dyn GenerativeService>,
    timeout: Duration,
    max_retries: u32,
    max_records: usize,
    max_chars: usize,
}

impl Summarizer {
    pub fn new(
        generator: Arc<dyn GenerativeService>,
        generation: &GenerationConfig,
        summary: &SummaryConfig,
    ) -> Self {
        Self {
            generator,
            timeout: Duration::from_millis(generation.timeout_ms),
            max_retries: generation.max_retries,
            max_records: summary.max_context_records,
            max_chars: summary.max_context_chars,
        }
    }

    pub fn generator(&self) -> &Arc<dyn GenerativeService> {
        &self.generator
    }

    /// Never fails: an empty result set gets [`NO_MATCHES`] without calling the
    /// generator, and any generation failure gets [`fallback_summary`].
    ///
    /// `known_places` is the vocabulary the grounding check looks for.
    pub async fn summarize(&self, query: &str, hits: &[SearchHit], known_places: &[String]) -> String {
        if hits.is_empty() {
            return NO_MATCHES.to_string();
        }

        let context = SummaryContext::build(hits, self.max_records, self.max_chars);

        match tokio::time::timeout(self.timeout, self.generate(&context, query, known_places)).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!(error = %e, "Summarization failed, using fallback");
                fallback_summary(hits.len())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Summarization timed out, using fallback"
                );
                fallback_summary(hits.len())
            }
        }
    }

    async fn generate(
        &self,
        context: &SummaryContext,
        query: &str,
        known_places: &[String],
    ) -> Result<String> {
        let mut last_error = SearchError::Summarization("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            let outcome = match self.generator.summarize(context, query).await {
                Ok(text) => check_grounding(&text, context, query, known_places).map(|_| text),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) => {
                    debug!(attempt, error = %e, "Summary attempt rejected");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Rejects a summary naming a place or blood group that is in neither the
/// context nor the query.
pub fn check_grounding(
    summary: &str,
    context: &SummaryContext,
    query: &str,
    known_places: &[String],
) -> Result<()> {
    if summary.trim().is_empty() {
        return Err(SearchError::Summarization("empty summary".to_string()));
    }

    let source = context.render();

    for place in known_places {
        if contains_phrase(summary, place)
            && !contains_phrase(&source, place)
            && !contains_phrase(query, place)
        {
            return Err(SearchError::Summarization(format!(
                "summary mentions '{}' which is not in the results",
                place
            )));
        }
    }

    let allowed: Vec<String> = blood_groups_in(&source)
        .into_iter()
        .chain(blood_groups_in(query))
        .chain(context.blood_groups.iter().cloned())
        .collect();

    if let Some(group) = blood_groups_in(summary)
        .into_iter()
        .find(|group| !allowed.contains(group))
    {
        return Err(SearchError::Summarization(format!(
            "summary mentions blood group {} which is not in the results",
            group
        )));
    }

    Ok(())
}
