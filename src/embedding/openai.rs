// file: src/embedding/openai.rs
// description: OpenAI-compatible embeddings endpoint client
// reference: https://platform.openai.com/docs/api-reference/embeddings

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{EmbeddingService, ensure_dimension};
use crate::error::{Result, SearchError};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::EmbeddingService(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            dimension,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: vec![text],
            model: &self.model,
        };

        debug!(
            "Requesting embedding from {} for {} chars",
            self.endpoint,
            text.len()
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            SearchError::EmbeddingService(format!("Failed to send embedding request: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::EmbeddingService(format!(
                "Embedding request failed with status {}: {}",
                status, error_text
            )));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            SearchError::EmbeddingService(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = embedding_response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| {
                SearchError::EmbeddingService("No embedding data returned".to_string())
            })?;

        debug!("Received embedding of dimension {}", embedding.len());
        ensure_dimension(embedding, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_and_blank_key() {
        let client = OpenAiEmbeddingClient::new(
            "http://localhost:11434/v1/",
            "all-minilm",
            Some("  ".to_string()),
            384,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/embeddings");
        assert!(client.api_key.is_none());
        assert_eq!(client.dimension(), 384);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_embedding_error() {
        let client = OpenAiEmbeddingClient::new(
            "http://127.0.0.1:9",
            "all-minilm",
            None,
            384,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client.embed("O+ donors").await.unwrap_err();
        assert!(matches!(err, SearchError::EmbeddingService(_)));
    }
}
