// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod api;
pub mod config;
pub mod database;
pub mod embedding;
pub mod error;
pub mod index;
pub mod mcp;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod query;
pub mod ranking;
pub mod summary;
pub mod utils;

pub use config::Config;
pub use database::{LanceRecordStore, MemoryRecordStore, RecordStore, open_store};
pub use embedding::{EmbeddingService, HashingEmbedder, build_embedder};
pub use error::{Result, SearchError};
pub use index::{EmbeddingIndex, IndexStats, UpsertOutcome, VectorIndex};
pub use models::{
    EntityType, RecordEvent, RecordKey, SearchHit, SearchRequest, SearchResponse, SourceId,
};
pub use normalizer::RecordNormalizer;
pub use pipeline::{IngestStats, ProgressTracker, SearchEngine, SearchContext};
pub use query::QueryPlanner;
pub use ranking::FusionRanker;
pub use summary::{GenerativeService, Summarizer, TemplateGenerator};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        let _normalizer = RecordNormalizer::new();
        let _planner = QueryPlanner::new(&config.planner, &config.ranking);
    }
}
