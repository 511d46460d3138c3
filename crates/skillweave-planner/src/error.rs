//! Error types for planning

use skillweave_provider::ProviderError;
use skillweave_retrieval::RetrievalError;
use thiserror::Error;

/// Planner errors.
///
/// Malformed model output is not an error: it decodes to neutral defaults.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Planner built over a catalog with no skills
    #[error("Skill catalog is empty")]
    EmptyCatalog,

    /// Hybrid retriever failed
    #[error("Skill retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Completion service failed
    #[error("LLM request failed: {0}")]
    Llm(#[from] ProviderError),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, PlannerError>;
