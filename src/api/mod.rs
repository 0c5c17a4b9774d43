// file: src/api/mod.rs
// description: network front ends over the search service
// reference: https://docs.rs/axum

pub mod http;

pub use http::{ApiError, router, serve};
