// file: src/pipeline/engine.rs
// description: query path from request to ranked results and grounded summary
// reference: plan, concurrent per-type retrieval, fusion, summarization

use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::config::{Config, RankingConfig};
use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::{SearchRequest, SearchResponse};
use crate::query::QueryPlanner;
use crate::ranking::{FusionRanker, TypeCandidates};
use crate::summary::{GenerativeService, NO_MATCHES, OUT_OF_DOMAIN, Summarizer};
use crate::utils::telemetry::OperationTimer;
use crate::utils::validation::Validator;

const SLOW_QUERY: Duration = Duration::from_secs(2);

/// Answers `{query, k?}` with ranked results and a summary.
///
/// Holds no per-query state; concurrent searches share nothing but the
/// read-only index snapshots.
pub struct SearchEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingService>,
    planner: QueryPlanner,
    ranker: FusionRanker,
    summarizer: Summarizer,
    ranking: RankingConfig,
}

impl SearchEngine {
    pub fn new(
        config: &Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerativeService>,
    ) -> Self {
        Self {
            index,
            embedder,
            planner: QueryPlanner::new(&config.planner, &config.ranking),
            ranker: FusionRanker::new(&config.ranking),
            summarizer: Summarizer::new(generator, &config.generation, &config.summary),
            ranking: config.ranking.clone(),
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingService> {
        &self.embedder
    }

    pub fn generator(&self) -> &Arc<dyn GenerativeService> {
        self.summarizer.generator()
    }

    /// Empty text or `k = 0` answers "no matching records" without touching
    /// any backend. Overlong text is cut, never rejected. Index and embedding failures are returned to the caller;
    /// summarization failures never are.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let text = Validator::query_text(&request.query);
        let k = Validator::resolve_k(request.k, &self.ranking);

        if text.is_empty() || k == 0 {
            return Ok(SearchResponse::empty(NO_MATCHES));
        }

        if !self.planner.in_domain(text) {
            debug!("Query rejected by domain guard");
            return Ok(SearchResponse::empty(OUT_OF_DOMAIN));
        }

        let query_id = Uuid::new_v4();
        let span = info_span!(
            "search",
            %query_id,
            query = %Validator::truncate_text(text, 80),
            k
        );

        self.run(text, k).instrument(span).await
    }

    async fn run(&self, text: &str, k: usize) -> Result<SearchResponse> {
        let timer = OperationTimer::new("search");
        let places = self.index.known_places();
        let plan = self
            .planner
            .plan(text, k, self.embedder.as_ref(), &places)
            .await?;

        let k_per_type = self.ranking.k_per_type(k);
        let vector = plan.vector.as_slice();

        let batches = try_join_all(self.ranking.entity_types.iter().map(|&entity_type| async move {
            let candidates = self.index.search(entity_type, vector, k_per_type).await?;
            Ok::<_, crate::error::SearchError>(TypeCandidates {
                entity_type,
                candidates,
            })
        }))
        .await?;

        let fetched: usize = batches.iter().map(|b| b.candidates.len()).sum();
        let results = self.ranker.fuse(batches, &plan.filters, &plan.weights, k);

        info!(
            fetched,
            returned = results.len(),
            intent = ?plan.intent,
            "Retrieval complete"
        );

        let ai_summary = self.summarizer.summarize(text, &results, &places).await;
        timer.warn_if_slow(SLOW_QUERY);

        Ok(SearchResponse {
            results,
            ai_summary,
        })
    }
}
