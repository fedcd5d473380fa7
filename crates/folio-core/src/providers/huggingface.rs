//! Hugging Face inference API embedding client.

use super::{http_error, transport_error, EmbeddingProvider};
use crate::config::{DEFAULT_EMBEDDING_MODEL, EMBED_BATCH_SIZE, PROVIDER_TIMEOUT};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default router endpoint for hosted inference.
pub const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/hf-inference";

/// Calls the `feature-extraction` pipeline of a sentence-transformers model.
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
}

impl HuggingFaceEmbedder {
    /// Client for `model` on the default router.
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        Self::with_options(
            api_key,
            DEFAULT_BASE_URL,
            DEFAULT_EMBEDDING_MODEL,
            EMBED_BATCH_SIZE,
            PROVIDER_TIMEOUT,
        )
    }

    pub fn with_options(
        api_key: &str,
        base_url: &str,
        model: &str,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Transport(
                "missing Hugging Face API key".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(ProviderError::Transport(
                "embedding batch size must be positive".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ProviderError::Transport("invalid Hugging Face API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: feature_extraction_url(base_url, model),
            model: model.to_string(),
            batch_size,
            timeout,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&FeatureExtractionRequest { inputs: texts })
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
        parse_embeddings(&body, texts.len())
    }
}

fn feature_extraction_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/models/{}/pipeline/feature-extraction",
        base_url.trim_end_matches('/'),
        model
    )
}

/// Decodes a feature-extraction body: one `[f32]` per input.
fn parse_embeddings(body: &str, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    let vectors: Vec<Vec<f32>> = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("not a list of vectors: {}", e)))?;
    if vectors.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "{} vectors for {} inputs",
            vectors.len(),
            expected
        )));
    }
    if vectors.iter().any(|v| v.is_empty()) {
        return Err(ProviderError::InvalidResponse("empty vector".to_string()));
    }
    Ok(vectors)
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    #[instrument(skip_all, fields(texts = texts.len(), model = %self.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
            debug!("Embedded {}/{} texts", vectors.len(), texts.len());
        }
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}
