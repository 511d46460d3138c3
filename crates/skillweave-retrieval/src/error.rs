//! Error types for retrieval

use skillweave_provider::ProviderError;
use thiserror::Error;

/// Retrieval errors
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Search requested before any non-empty corpus was supplied
    #[error("Corpus is empty. Provide a non-empty corpus before searching")]
    NoCorpus,

    /// Embedding collaborator failed
    #[error("Embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    /// Vectors of different sizes in one index, or query vs index mismatch
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index
        expected: usize,
        /// Offending dimension
        actual: usize,
    },

    /// Embedding model returned a different number of vectors than texts
    #[error("Embedding model returned {actual} vectors for {expected} texts")]
    VectorCount {
        /// Number of texts sent
        expected: usize,
        /// Number of vectors received
        actual: usize,
    },

    /// Blocking scorer task panicked or was cancelled
    #[error("Scoring task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, RetrievalError>;
