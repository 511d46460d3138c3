//! Skillweave Provider - model collaborators consumed by the planner and retriever
//!
//! ## Features
//!
//! - [`LlmClient`]: `generate(messages) -> text` over any OpenAI-compatible
//!   chat endpoint (OpenAI, Ollama, vLLM, ...)
//! - [`EmbeddingModel`]: `embed(texts) -> vectors` plus `segment(text) -> tokens`,
//!   shared by the dense and lexical retrieval sides
//! - [`HashingEmbedder`]: deterministic offline embedder for tests and air-gapped use
//! - [`ScriptedLlm`]: queued-response client for tests and dry runs
//! - [`reply`]: best-effort decoding of JSON replies into typed structs

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod embedding;
pub mod error;
pub mod llm;
pub mod mock;
pub mod reply;

pub use embedding::{build_embedder, segment_text, EmbeddingModel, HashingEmbedder, OpenAiEmbedder};
pub use error::{ProviderError, Result};
pub use llm::{build_llm, LlmClient, OpenAiClient};
pub use mock::ScriptedLlm;
pub use reply::parse_response;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{EmbeddingModel, LlmClient, ProviderError};
}
