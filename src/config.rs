// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{Result, SearchError};
use crate::models::EntityType;
use crate::ranking::Calibration;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const ENV_PREFIX: &str = "BLOODBANK_SEARCH";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Upper bound on the requested result count.
pub const MAX_K_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub index: IndexConfig,
    pub ranking: RankingConfig,
    pub planner: PlannerConfig,
    pub summary: SummaryConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint
    Openai,
    /// Offline feature-hashing embedder
    Hashing,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub timeout_secs: u64,
    pub cache_max_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Openai,
            base_url: "http://localhost:11434/v1".to_string(),
            model: "all-minilm".to_string(),
            api_key: None,
            dimension: 384,
            timeout_secs: 10,
            cache_max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// OpenAI-compatible `/chat/completions` endpoint
    Openai,
    /// Deterministic template summaries only
    Template,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Template,
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            timeout_ms: 8000,
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    pub hnsw_m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub persist: bool,
    pub uri: String,
    pub table_name: String,
    pub refresh_interval_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            ef_construction: 100,
            ef_search: 64,
            persist: true,
            uri: "data/lancedb".to_string(),
            table_name: "records".to_string(),
            refresh_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RankingConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub overfetch_factor: usize,
    pub relevance_floor: f32,
    pub entity_types: Vec<EntityType>,
    pub off_intent_weight: f32,
    pub calibration: BTreeMap<EntityType, Calibration>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            max_k: MAX_K_LIMIT,
            overfetch_factor: 2,
            relevance_floor: 0.30,
            entity_types: EntityType::ALL.to_vec(),
            off_intent_weight: 0.85,
            calibration: EntityType::ALL
                .into_iter()
                .map(|entity_type| (entity_type, Calibration::cosine()))
                .collect(),
        }
    }
}

impl RankingConfig {
    /// Candidates fetched per entity type for an overall request of `k`.
    pub fn k_per_type(&self, k: usize) -> usize {
        let factor = self.overfetch_factor.max(1);
        k.min(self.max_k) * factor
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub domain_guard: bool,
    pub domain_keywords: Vec<String>,
    pub extra_places: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let keywords = [
            "donor", "blood", "hospital", "request", "patient", "age", "city", "location",
            "capacity", "urgent", "units",
        ];
        Self {
            domain_guard: false,
            domain_keywords: keywords.iter().map(|k| k.to_string()).collect(),
            extra_places: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub max_context_records: usize,
    pub max_context_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_context_records: 5,
            max_context_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    pub queue_capacity: usize,
    pub parallel_workers: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            parallel_workers: 4,
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| SearchError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| SearchError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        let ranking = &self.ranking;

        if ranking.max_k == 0 || ranking.max_k > MAX_K_LIMIT {
            return Err(SearchError::Config(format!(
                "ranking.max_k must be between 1 and {}",
                MAX_K_LIMIT
            )));
        }

        if ranking.default_k > ranking.max_k {
            return Err(SearchError::Config(
                "ranking.default_k must not exceed ranking.max_k".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&ranking.relevance_floor) {
            return Err(SearchError::Config(
                "ranking.relevance_floor must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&ranking.off_intent_weight) {
            return Err(SearchError::Config(
                "ranking.off_intent_weight must be within [0, 1]".to_string(),
            ));
        }

        if ranking.entity_types.is_empty() {
            return Err(SearchError::Config(
                "ranking.entity_types must name at least one entity type".to_string(),
            ));
        }

        for entity_type in &ranking.entity_types {
            let calibration = ranking.calibration.get(entity_type).ok_or_else(|| {
                SearchError::Config(format!(
                    "ranking.calibration.{} is required for every configured entity type",
                    entity_type
                ))
            })?;
            calibration.validate()?;
        }

        if self.embedding.dimension == 0 {
            return Err(SearchError::Config(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }

        if self.ingest.parallel_workers == 0 {
            return Err(SearchError::Config(
                "ingest.parallel_workers must be greater than 0".to_string(),
            ));
        }

        if self.ingest.queue_capacity == 0 {
            return Err(SearchError::Config(
                "ingest.queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.index.hnsw_m < 2 {
            return Err(SearchError::Config(
                "index.hnsw_m must be at least 2".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.ranking.default_k, 10);
        assert_eq!(config.generation.timeout_ms, 8000);
        assert_eq!(config.ranking.k_per_type(10), 20);
        assert_eq!(config.ranking.k_per_type(500), 100);
    }

    #[test]
    fn test_missing_calibration_is_rejected() {
        let mut config = Config::default_config();
        config.ranking.calibration.remove(&EntityType::Hospital);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("calibration.hospital"));
    }

    #[test]
    fn test_partial_calibration_in_file_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[ranking.calibration.donor]\nkind = \"min_max\"").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn test_bounds_are_enforced() {
        let mut config = Config::default_config();
        config.ranking.max_k = 80;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.ranking.default_k = 20;
        config.ranking.max_k = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.ranking.relevance_floor = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.ingest.parallel_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_merges_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[embedding]
provider = "hashing"
dimension = 256

[ranking]
relevance_floor = 0.1

[ranking.calibration.donor]
kind = "affine"
scale = 0.5
offset = 0.5

[ranking.calibration.hospital]
kind = "range"
min = 0.0
max = 1.0

[ranking.calibration.request]
kind = "min_max"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hashing);
        assert_eq!(config.embedding.dimension, 256);
        assert_eq!(config.ranking.max_k, 50);
        assert_eq!(
            config.ranking.calibration.get(&EntityType::Donor),
            Some(&Calibration::Affine {
                scale: 0.5,
                offset: 0.5
            })
        );
    }
}
