// file: src/summary/generator.rs
// description: generative service contract, chat-completions client and template generator
// reference: https://platform.openai.com/docs/api-reference/chat

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::context::SummaryContext;
use super::prompt::{PromptTemplate, SYSTEM_PROMPT};
use crate::config::{GenerationConfig, GenerationProvider};
use crate::error::{Result, SearchError};

/// Black-box text generator: `summarize(context, query) -> text`.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn summarize(&self, context: &SummaryContext, query: &str) -> Result<String>;

    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

pub fn build_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerativeService>> {
    Ok(match config.provider {
        GenerationProvider::Openai => Arc::new(OpenAiChatClient::new(
            &config.base_url,
            &config.model,
            config.api_key.clone(),
            Duration::from_millis(config.timeout_ms),
        )?),
        GenerationProvider::Template => Arc::new(TemplateGenerator),
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client with a grounded system prompt.
pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    models_endpoint: String,
    api_key: Option<String>,
    model: String,
    prompt: PromptTemplate,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Summarization(format!("Failed to build HTTP client: {}", e)))?;
        let base = base_url.trim_end_matches('/');

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base),
            models_endpoint: format!("{}/models", base),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            prompt: PromptTemplate::new(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl GenerativeService for OpenAiChatClient {
    async fn summarize(&self, context: &SummaryContext, query: &str) -> Result<String> {
        let user = self.prompt.render(&context.render(), query);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.0,
            stream: false,
        };

        debug!(
            "Requesting summary from {} over {} context lines",
            self.endpoint,
            context.included()
        );

        let response = self
            .authorize(self.client.post(&self.endpoint).json(&request))
            .send()
            .await
            .map_err(|e| SearchError::Summarization(format!("Failed to send chat request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::Summarization(format!(
                "Chat request failed with status {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            SearchError::Summarization(format!("Failed to parse chat response: {}", e))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| SearchError::Summarization("Empty chat completion".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .authorize(self.client.get(&self.models_endpoint))
            .send()
            .await
            .map_err(|e| SearchError::Summarization(format!("Generative service unreachable: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SearchError::Summarization(format!(
                "Generative service returned {}",
                response.status()
            )))
        }
    }
}

/// Deterministic summaries built only from the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn compose(context: &SummaryContext, query: &str) -> String {
        let mut summary = format!(
            "Query '{}' returned {} results.",
            query.trim(),
            context.total_results
        );

        if let Some(label) = &context.top_label {
            summary.push_str(&format!(" Top match: {}.", label));
        }
        if !context.places.is_empty() {
            summary.push_str(&format!(" Places: {}.", context.places.join(", ")));
        }
        if !context.blood_groups.is_empty() {
            summary.push_str(&format!(" Blood groups: {}.", context.blood_groups.join(", ")));
        }
        summary
    }
}

#[async_trait]
impl GenerativeService for TemplateGenerator {
    async fn summarize(&self, context: &SummaryContext, query: &str) -> Result<String> {
        Ok(Self::compose(context, query))
    }

    fn name(&self) -> &str {
        "template"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SummaryContext {
        SummaryContext {
            lines: vec!["[1] donor: name=Asha, blood_group=O+, city=Udaipur".to_string()],
            total_results: 2,
            top_label: Some("Asha (Blood Group O+, City Udaipur)".to_string()),
            places: vec!["Udaipur".to_string()],
            blood_groups: vec!["O+".to_string()],
        }
    }

    #[tokio::test]
    async fn test_template_summary() {
        let summary = TemplateGenerator
            .summarize(&context(), " O+ donors in Udaipur ")
            .await
            .unwrap();
        assert_eq!(
            summary,
            "Query 'O+ donors in Udaipur' returned 2 results. \
             Top match: Asha (Blood Group O+, City Udaipur). \
             Places: Udaipur. Blood groups: O+."
        );
    }

    #[test]
    fn test_chat_endpoints() {
        let client = OpenAiChatClient::new(
            "http://localhost:11434/v1/",
            "llama3.2",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(client.models_endpoint, "http://localhost:11434/v1/models");
        assert_eq!(client.name(), "llama3.2");
    }

    #[tokio::test]
    async fn test_unreachable_chat_is_summarization_error() {
        let client = OpenAiChatClient::new(
            "http://127.0.0.1:9",
            "llama3.2",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client.summarize(&context(), "O+ donors").await.unwrap_err();
        assert!(matches!(err, SearchError::Summarization(_)));
        assert!(client.health_check().await.is_err());
    }

    #[test]
    fn test_build_template_generator() {
        let generator = build_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(generator.name(), "template");
    }
}
