//! OpenRouter chat-completions client.

use super::{http_error, transport_error, GenerationProvider};
use crate::config::{DEFAULT_GENERATION_MODEL, PROVIDER_TIMEOUT};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Single-turn, temperature-0 completion against an OpenRouter model.
#[derive(Clone)]
pub struct OpenRouterGenerator {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl OpenRouterGenerator {
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        Self::with_options(
            api_key,
            DEFAULT_BASE_URL,
            DEFAULT_GENERATION_MODEL,
            PROVIDER_TIMEOUT,
        )
    }

    pub fn with_options(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Transport(
                "missing OpenRouter API key".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .map_err(|_| ProviderError::Transport("invalid OpenRouter API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            timeout,
        })
    }
}

/// Extracts `choices[0].message.content`.
fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed completion: {}", e)))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::InvalidResponse("completion has no content".to_string()))
}

#[async_trait]
impl GenerationProvider for OpenRouterGenerator {
    #[instrument(skip_all, fields(prompt_len = prompt.len(), model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        parse_completion(&body)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
