//! Skillweave Types - Core types shared by the skillweave crates
//!
//! This crate defines the data model passed between the retriever, the
//! planner, the execution engine and the gateway binary.

pub mod plan;
pub mod provider;
pub mod skill;

pub use plan::{order_respects_dag, ExecutionStep, PlanStats, SkillDag, SkillDagResult};
pub use provider::{EmbeddingProvider, LlmProvider};
pub use skill::{SkillCatalog, SkillFile, SkillFileKind, SkillRecord};

use serde::{Deserialize, Serialize};

/// Chat role for messages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to a completion service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
