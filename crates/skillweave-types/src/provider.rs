use serde::{Deserialize, Serialize};

/// LLM completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LlmProvider {
    OpenAI {
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
    },
    Ollama {
        model: String,
        base_url: String,
    },
}

impl LlmProvider {
    pub fn openai(model: impl Into<String>) -> Self {
        Self::OpenAI {
            model: model.into(),
            api_key: None,
            base_url: None,
        }
    }

    pub fn openai_full(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        Self::OpenAI {
            model: model.into(),
            api_key,
            base_url,
        }
    }

    pub fn ollama(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::Ollama {
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    /// Model name regardless of backend
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAI { model, .. } | Self::Ollama { model, .. } => model,
        }
    }
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::openai("gpt-4o-mini")
    }
}

/// Embedding / tokenization provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EmbeddingProvider {
    /// Remote OpenAI-compatible `/embeddings` endpoint
    OpenAI {
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
    },
    /// Offline feature-hashing embedder, deterministic and dependency free
    Hashing { dimensions: usize },
}

impl EmbeddingProvider {
    pub fn openai(model: impl Into<String>) -> Self {
        Self::OpenAI {
            model: model.into(),
            api_key: None,
            base_url: None,
        }
    }

    pub fn hashing(dimensions: usize) -> Self {
        Self::Hashing { dimensions }
    }
}

impl Default for EmbeddingProvider {
    fn default() -> Self {
        Self::openai("text-embedding-3-small")
    }
}
