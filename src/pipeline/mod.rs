// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: query engine, ingest and service wiring

pub mod engine;
pub mod ingest;
mod progress;
pub mod refresh;
pub mod context;

pub use engine::SearchEngine;
pub use ingest::{EventApplier, IngestWorker, ingest_bulk};
pub use progress::{EventOutcome, IngestCounters, IngestStats, ProgressTracker};
pub use refresh::IndexRefresher;
pub use context::SearchContext;
