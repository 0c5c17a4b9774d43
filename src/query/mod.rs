// file: src/query/mod.rs
// description: query planning module exports
// reference: internal module structure

pub mod patterns;
pub mod planner;

pub use planner::{QueryAnalysis, QueryPlanner};
