// file: src/summary/mod.rs
// description: grounded summarizer module exports
// reference: internal module structure

pub mod context;
pub mod generator;
pub mod prompt;
pub mod summarizer;

pub use context::SummaryContext;
pub use generator::{GenerativeService, OpenAiChatClient, TemplateGenerator, build_generator};
pub use prompt::PromptTemplate;
pub use summarizer::{NO_MATCHES, OUT_OF_DOMAIN, Summarizer, check_grounding, fallback_summary};
