//! Remote model providers.
//!
//! The engine only talks to [`EmbeddingProvider`] and [`GenerationProvider`];
//! [`HuggingFaceEmbedder`] and [`OpenRouterGenerator`] are the HTTP
//! implementations used in production. Deterministic in-process providers
//! live in [`crate::testing`].

mod huggingface;
mod openrouter;

pub use huggingface::{HuggingFaceEmbedder, DEFAULT_BASE_URL as HUGGINGFACE_BASE_URL};
pub use openrouter::{OpenRouterGenerator, DEFAULT_BASE_URL as OPENROUTER_BASE_URL};

use crate::error::ProviderError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Turns texts into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds every text, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embeds a single query string.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            n => Err(ProviderError::InvalidResponse(format!(
                "expected 1 vector for query, got {}",
                n
            ))),
        }
    }

    /// Identifies the model; persisted alongside the vectors it produced.
    fn model_id(&self) -> &str;

    /// Most texts one external request carries. Callers bound each `embed`
    /// call of at most this many texts by the provider timeout.
    fn max_batch_size(&self) -> usize {
        usize::MAX
    }
}

/// Completes a prompt with generated text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    fn model_id(&self) -> &str;
}

/// Bounds a provider call, mapping expiry to [`ProviderError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

/// Maps a reqwest failure to a provider error, keeping timeouts distinct.
pub(crate) fn transport_error(err: reqwest::Error, limit: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(limit)
    } else if let Some(status) = err.status() {
        ProviderError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Reads a non-success response into `ProviderError::Http`.
pub(crate) async fn http_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    ProviderError::Http {
        status,
        message: extract_error_message(&body),
    }
}

/// Pulls `error` / `error.message` out of a JSON error body, else the raw body.
fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("error") {
            Some(serde_json::Value::String(message)) => return message.clone(),
            Some(obj) => {
                if let Some(message) = obj.get("message").and_then(|m| m.as_str()) {
                    return message.to_string();
                }
            }
            None => {}
        }
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<(), ProviderError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(ProviderError::Timeout(Duration::from_millis(10)))
        );
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":"Model is loading"}"#),
            "Model is loading"
        );
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"Rate limit exceeded","code":429}}"#),
            "Rate limit exceeded"
        );
        assert_eq!(extract_error_message("  Bad Gateway \n"), "Bad Gateway");
    }
}
