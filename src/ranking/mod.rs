// file: src/ranking/mod.rs
// description: retrieval score calibration and cross-type fusion exports
// reference: internal module structure

pub mod calibration;
pub mod fusion;

pub use calibration::Calibration;
pub use fusion::{FusionRanker, TypeCandidates, compare_hits};
