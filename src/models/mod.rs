// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod entity;
pub mod event;
pub mod query;
pub mod record;
pub mod search_result;

pub use entity::{EntityType, RecordKey, SourceId};
pub use event::RecordEvent;
pub use query::{
    Comparison, EntityWeights, NumericFilter, QueryFilters, QueryPlan, SearchRequest,
};
pub use record::{IndexedRecord, Metadata, NormalizedRecord};
pub use search_result::{Candidate, SearchHit, SearchResponse};
