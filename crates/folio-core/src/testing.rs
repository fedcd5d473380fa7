//! Deterministic in-process providers.
//!
//! Used by the test suites and by the CLI's offline mode. None of these make
//! network calls.

use crate::engine::answer::{context_of, NO_ANSWER};
use crate::error::ProviderError;
use crate::providers::{EmbeddingProvider, GenerationProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default dimension of [`HashingEmbedder`].
pub const HASHING_DIMENSION: usize = 256;

/// Bag-of-words embedder using the hashing trick.
///
/// Every lowercase alphanumeric token is hashed with BLAKE3 into one signed
/// bucket; the resulting vector is L2-normalized. Texts sharing words have
/// positive cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_id: format!("hashing-bow-{}", dimension.max(1)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds one text synchronously.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Answers with the first line of the prompt's context.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    /// Upper bound on the answer length, in characters.
    const MAX_CHARS: usize = 400;
}

#[async_trait]
impl GenerationProvider for ExtractiveGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let line = context_of(prompt)
            .and_then(|context| context.lines().map(str::trim).find(|l| !l.is_empty()));
        Ok(match line {
            Some(line) => line.chars().take(Self::MAX_CHARS).collect(),
            None => NO_ANSWER.to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "extractive"
    }
}

/// Embedder that always fails.
#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    error: ProviderError,
    calls: std::sync::Arc<AtomicUsize>,
}

impl FailingEmbedder {
    pub fn new(error: ProviderError) -> Self {
        Self {
            error,
            calls: Default::default(),
        }
    }

    /// Number of `embed` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

/// Generator that always fails.
#[derive(Debug, Clone)]
pub struct FailingGenerator {
    error: ProviderError,
}

impl FailingGenerator {
    pub fn new(error: ProviderError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl GenerationProvider for FailingGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(self.error.clone())
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}
