//! Skillweave Retrieval - hybrid dense + lexical search over a text corpus
//!
//! ## Features
//!
//! - BM25 lexical index (`k1`/`b` saturation, smoothed idf)
//! - Dense index over L2-normalized embeddings (cosine via inner product)
//! - Z-score normalization of both score lists, weighted fusion, sigmoid to `[0, 1]`
//! - Corpus swap guarded by a mutex; searches observe either the old or the new
//!   snapshot, never a half-built one
//! - Sequential and concurrent (dense and sparse scored in parallel) search paths

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bm25;
pub mod dense;
pub mod error;
pub mod fusion;
pub mod hybrid;

pub use bm25::{Bm25Params, LexicalIndex};
pub use dense::DenseIndex;
pub use error::{Result, RetrievalError};
pub use hybrid::{HybridRetriever, RetrievalHit, SearchOptions};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{HybridRetriever, RetrievalError, RetrievalHit, SearchOptions};
}
