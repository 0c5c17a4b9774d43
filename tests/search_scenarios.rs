// file: tests/search_scenarios.rs
// description: end-to-end query scenarios against the offline embedder and test doubles
// reference: inbound {query, k?} -> {results, ai_summary} contract

use async_trait::async_trait;
use bloodbank_search::database::MemoryRecordStore;
use bloodbank_search::index::HnswParams;
use bloodbank_search::models::{Candidate, Metadata, NormalizedRecord};
use bloodbank_search::summary::SummaryContext;
use bloodbank_search::{
    Config, EmbeddingIndex, EmbeddingService, EntityType, GenerativeService, HashingEmbedder,
    IndexStats, RecordKey, RecordNormalizer, Result, SearchEngine, SearchError, SearchRequest,
    SearchResponse, SourceId, TemplateGenerator, UpsertOutcome, VectorIndex,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DIM: usize = 512;

fn fields(value: Value) -> Metadata {
    value.as_object().cloned().expect("test fields are an object")
}

fn config() -> Config {
    let mut config = Config::default_config();
    config.embedding.dimension = DIM;
    config.index.persist = false;
    config.ranking.relevance_floor = 0.0;
    config
}

async fn seed(index: &EmbeddingIndex, entity_type: EntityType, id: u64, value: Value) -> UpsertOutcome {
    let record = RecordNormalizer::new()
        .normalize(entity_type, &SourceId::from(id), &fields(value))
        .unwrap();
    index.upsert(record).await.unwrap()
}

async fn blood_bank() -> Arc<EmbeddingIndex> {
    let index = Arc::new(EmbeddingIndex::new(
        Arc::new(HashingEmbedder::new(DIM)),
        Arc::new(MemoryRecordStore::new()),
        HnswParams::default(),
    ));

    seed(
        &index,
        EntityType::Donor,
        1,
        json!({"name": "Asha", "age": 29, "blood_group": "O+", "city": "Udaipur"}),
    )
    .await;
    seed(
        &index,
        EntityType::Donor,
        2,
        json!({"name": "Ravi", "age": 41, "blood_group": "B+", "city": "Jaipur"}),
    )
    .await;
    seed(
        &index,
        EntityType::Hospital,
        7,
        json!({"name": "City Hospital", "location": "Udaipur", "capacity": 50}),
    )
    .await;
    index
}

fn engine_with(index: Arc<dyn VectorIndex>, generator: Arc<dyn GenerativeService>, config: &Config) -> SearchEngine {
    SearchEngine::new(config, index, Arc::new(HashingEmbedder::new(DIM)), generator)
}

fn assert_ranked(response: &SearchResponse) {
    for pair in response.results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "scores must not increase");
    }
    for hit in &response.results {
        assert!((0.0..=1.0).contains(&hit.score));
    }
}

/// Counts calls; can be told to fail.
#[derive(Default)]
struct CountingEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl EmbeddingService for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchError::EmbeddingService("connection reset".into()));
        }
        Ok(HashingEmbedder::new(DIM).embed_sync(text))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Index double that counts searches and can be down.
#[derive(Default)]
struct ScriptedIndex {
    searches: AtomicUsize,
    down: bool,
    hits: Vec<Candidate>,
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn search(&self, entity_type: EntityType, _vector: &[f32], k: usize) -> Result<Vec<Candidate>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(SearchError::IndexUnavailable("backend unreachable".into()));
        }
        Ok(self
            .hits
            .iter()
            .filter(|c| c.key.entity_type == entity_type)
            .take(k)
            .cloned()
            .collect())
    }

    async fn upsert(&self, _record: NormalizedRecord) -> Result<UpsertOutcome> {
        Ok(UpsertOutcome::Unchanged)
    }

    async fn delete(&self, _key: &RecordKey) -> Result<bool> {
        Ok(false)
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats::default())
    }

    fn known_places(&self) -> Vec<String> {
        Vec::new()
    }
}

struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerativeService for CountingGenerator {
    async fn summarize(&self, context: &SummaryContext, query: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TemplateGenerator::compose(context, query))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct SlowGenerator;

#[async_trait]
impl GenerativeService for SlowGenerator {
    async fn summarize(&self, _context: &SummaryContext, _query: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn donor_outranks_hospital_for_donor_query() {
    let index = blood_bank().await;
    let engine = engine_with(index, Arc::new(TemplateGenerator), &config());

    let response = engine
        .search(&SearchRequest::new("O+ donors in Udaipur").with_k(5))
        .await
        .unwrap();

    let kinds: Vec<EntityType> = response.results.iter().map(|h| h.entity_type).collect();
    assert_eq!(kinds, vec![EntityType::Donor, EntityType::Hospital]);
    assert_eq!(response.results[0].metadata["name"], "Asha");
    assert!(response.results[0].score > response.results[1].score);
    assert_ranked(&response);

    assert!(response.ai_summary.contains("Udaipur"));
    assert!(response.ai_summary.contains("O+"));
    assert!(!response.ai_summary.contains("Jaipur"));
}

#[tokio::test]
async fn empty_query_makes_no_backend_calls() {
    let index = Arc::new(ScriptedIndex::default());
    let embedder = Arc::new(CountingEmbedder::default());
    let generator = Arc::new(CountingGenerator {
        calls: AtomicUsize::new(0),
    });
    let engine = SearchEngine::new(&config(), index.clone(), embedder.clone(), generator.clone());

    let response = engine.search(&SearchRequest::new("")).await.unwrap();

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"results": [], "ai_summary": "no matching records"})
    );
    assert_eq!(index.searches.load(Ordering::SeqCst), 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn generator_timeout_keeps_results_and_uses_template() {
    let index = blood_bank().await;
    let mut config = config();
    config.generation.timeout_ms = 50;

    let request = SearchRequest::new("donors in Udaipur").with_k(5);
    let expected = engine_with(index.clone(), Arc::new(TemplateGenerator), &config)
        .search(&request)
        .await
        .unwrap();
    let slow = engine_with(index, Arc::new(SlowGenerator), &config)
        .search(&request)
        .await
        .unwrap();

    assert!(!slow.results.is_empty());
    assert_eq!(slow.results, expected.results);
    assert_eq!(
        slow.ai_summary,
        format!("Found {} records matching your query", slow.results.len())
    );
}

#[tokio::test]
async fn unavailable_index_fails_the_query() {
    let index = Arc::new(ScriptedIndex {
        down: true,
        ..Default::default()
    });
    let engine = engine_with(index, Arc::new(TemplateGenerator), &config());

    let err = engine
        .search(&SearchRequest::new("O+ donors"))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::IndexUnavailable(_)));
    assert_eq!(err.public_message(), "search temporarily unavailable");
}

#[tokio::test]
async fn embedding_failure_is_not_replaced_by_a_zero_vector() {
    let index = Arc::new(ScriptedIndex::default());
    let embedder = Arc::new(CountingEmbedder {
        fail: true,
        ..Default::default()
    });
    let engine = SearchEngine::new(&config(), index.clone(), embedder, Arc::new(TemplateGenerator));

    let err = engine
        .search(&SearchRequest::new("O+ donors"))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::EmbeddingService(_)));
    assert_eq!(index.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn equal_scores_break_ties_by_type_then_id() {
    let candidate = |entity_type, id: u64| Candidate {
        key: RecordKey::new(entity_type, id),
        metadata: Arc::new(fields(json!({"name": format!("record {}", id)}))),
        raw_score: 0.8,
    };
    let index = Arc::new(ScriptedIndex {
        hits: vec![
            candidate(EntityType::Request, 1),
            candidate(EntityType::Hospital, 3),
            candidate(EntityType::Donor, 10),
            candidate(EntityType::Donor, 2),
        ],
        ..Default::default()
    });
    let engine = engine_with(index, Arc::new(TemplateGenerator), &config());

    let response = engine
        .search(&SearchRequest::new("blood").with_k(3))
        .await
        .unwrap();

    let order: Vec<(EntityType, String)> = response
        .results
        .iter()
        .map(|h| (h.entity_type, h.metadata["name"].as_str().unwrap_or_default().to_string()))
        .collect();
    assert_eq!(
        order,
        vec![
            (EntityType::Donor, "record 2".to_string()),
            (EntityType::Donor, "record 10".to_string()),
            (EntityType::Hospital, "record 3".to_string()),
        ]
    );
}

#[tokio::test]
async fn results_never_exceed_k() {
    let index = blood_bank().await;
    for id in 100..130u64 {
        seed(
            &index,
            EntityType::Donor,
            id,
            json!({"name": format!("Donor {}", id), "blood_group": "A+", "city": "Udaipur"}),
        )
        .await;
    }
    let engine = engine_with(index, Arc::new(TemplateGenerator), &config());

    for k in [1usize, 3, 10] {
        let response = engine
            .search(&SearchRequest::new("donors in Udaipur").with_k(k))
            .await
            .unwrap();
        assert_eq!(response.results.len(), k);
        assert_ranked(&response);
    }

    let clamped = engine
        .search(&SearchRequest::new("donors in Udaipur").with_k(500))
        .await
        .unwrap();
    assert!(clamped.results.len() <= 50);
}

#[tokio::test]
async fn upsert_is_idempotent_and_delete_hides_the_record() {
    let index = blood_bank().await;
    let again = seed(
        &index,
        EntityType::Donor,
        1,
        json!({"name": "Asha", "age": 29, "blood_group": "O+", "city": "Udaipur"}),
    )
    .await;
    assert_eq!(again, UpsertOutcome::Unchanged);
    assert_eq!(index.stats().unwrap().live(EntityType::Donor), 2);

    let engine = engine_with(index.clone(), Arc::new(TemplateGenerator), &config());
    let request = SearchRequest::new("O+ donors in Udaipur").with_k(5);
    let before = engine.search(&request).await.unwrap();
    assert!(before.results.iter().any(|h| h.metadata["name"] == "Asha"));

    assert!(index.delete(&RecordKey::new(EntityType::Donor, 1u64)).await.unwrap());
    let after = engine.search(&request).await.unwrap();
    assert!(after.results.iter().all(|h| h.metadata["name"] != "Asha"));
    assert!(!index.delete(&RecordKey::new(EntityType::Donor, 1u64)).await.unwrap());
}

#[test]
fn normalization_is_deterministic() {
    let normalizer = RecordNormalizer::new();
    let record = fields(json!({
        "patient_name": "  Meera ",
        "patient_age": 54,
        "blood_group": "AB-",
        "units_requested": 2,
        "status": "pending"
    }));
    let id = SourceId::from(3u64);

    let first = normalizer.normalize(EntityType::Request, &id, &record).unwrap();
    let second = normalizer.normalize(EntityType::Request, &id, &record).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.metadata, record);
    assert!(first.text.starts_with("Request: Patient Meera"));
}
