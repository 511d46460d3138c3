//! Error types for model providers

use thiserror::Error;

/// Provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request could not be built or the endpoint rejected it
    #[error("Request error: {0}")]
    Request(#[from] async_openai::error::OpenAIError),

    /// Endpoint answered without any usable payload
    #[error("Empty response from model '{0}'")]
    EmptyResponse(String),

    /// Provider misconfiguration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, ProviderError>;
