//! Embedding and tokenization collaborators
//!
//! Both retrieval scorers tokenize through [`EmbeddingModel::segment`] so the
//! lexical and dense sides see the same token boundaries.

use crate::error::{ProviderError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use skillweave_types::EmbeddingProvider;
use std::sync::Arc;
use tracing::{debug, info};

/// Inputs per `/embeddings` request
const EMBED_BATCH_SIZE: usize = 64;

/// Embedding + tokenization service
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed each text into a fixed-dimension vector
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Split text into lexical tokens
    fn segment(&self, text: &str) -> Vec<String> {
        segment_text(text)
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // Hiragana, Katakana
        | 0x3400..=0x4DBF    // CJK Extension A
        | 0x4E00..=0x9FFF    // CJK Unified Ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK Compatibility Ideographs
        | 0x20000..=0x2A6DF) // CJK Extension B
}

/// Default tokenizer: lower-cased alphanumeric runs, CJK characters one per token.
pub fn segment_text(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() || c == '_' {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// Create an embedder for `model`
    pub fn new(model: impl Into<String>, api_key: Option<&str>, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            config = config.with_api_key(key);
        }
        if let Some(url) = base_url.filter(|u| !u.is_empty()) {
            config = config.with_api_base(url);
        }
        let model = model.into();
        info!("Embedding client initialized with model {}", model);
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(EmbeddingInput::StringArray(batch.to_vec()))
                .build()?;

            let mut response = self.client.embeddings().create(request).await?;
            if response.data.len() != batch.len() {
                return Err(ProviderError::EmptyResponse(self.model.clone()));
            }
            response.data.sort_by_key(|e| e.index);
            vectors.extend(response.data.into_iter().map(|e| e.embedding));
        }

        debug!("Embedded {} text(s) with {}", texts.len(), self.model);
        Ok(vectors)
    }
}

/// Offline embedder using signed feature hashing over the token stream.
///
/// Texts sharing tokens get similar vectors, which is enough for
/// deterministic tests and for running without an embedding endpoint.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of `dimensions` components
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Output dimension
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
            (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in self.segment(text) {
            let hash = Self::fnv1a(token.as_bytes());
            let slot = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Build the configured embedding model
pub fn build_embedder(provider: &EmbeddingProvider) -> Arc<dyn EmbeddingModel> {
    match provider {
        EmbeddingProvider::OpenAI {
            model,
            api_key,
            base_url,
        } => Arc::new(OpenAiEmbedder::new(
            model.clone(),
            api_key.as_deref(),
            base_url.as_deref(),
        )),
        EmbeddingProvider::Hashing { dimensions } => Arc::new(HashingEmbedder::new(*dimensions)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_lowercases_and_splits_punctuation() {
        assert_eq!(
            segment_text("Extract PDF-tables, then build_report!"),
            vec!["extract", "pdf", "tables", "then", "build_report"]
        );
    }

    #[test]
    fn test_segment_splits_cjk_per_character() {
        assert_eq!(segment_text("pdf转换excel"), vec!["pdf", "转", "换", "excel"]);
    }

    #[test]
    fn test_segment_empty() {
        assert!(segment_text("  ,;  ").is_empty());
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["merge pdf files".to_string(), "merge pdf files".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap_or_default();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 64);
        assert_eq!(vectors[0], vectors[1]);
        assert!(vectors[0].iter().any(|v| *v != 0.0));
    }

    #[tokio::test]
    async fn test_hashing_embedder_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        let vectors = embedder.embed(&[String::new()]).await.unwrap_or_default();
        assert_eq!(vectors, vec![vec![0.0; 8]]);
    }
}
