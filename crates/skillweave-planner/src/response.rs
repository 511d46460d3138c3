//! Typed replies of the planner's model calls
//!
//! Every payload decodes into a struct that falls back to its neutral
//! `Default` instead of failing the planning run. Fields decode one by one:
//! a `null` or mistyped value only resets that field, the rest of the
//! payload is kept.

use serde::Deserialize;
use skillweave_provider::reply::{flag_or_true, lenient};
use skillweave_types::{ExecutionStep, SkillDag};
use std::collections::BTreeMap;

pub use skillweave_provider::reply::{extract_json, parse_response, strip_code_fences};

/// Query classification
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryAnalysis {
    /// False for chat-only queries
    #[serde(deserialize_with = "flag_or_true")]
    pub needs_skills: bool,
    /// One-line restatement of the task
    #[serde(deserialize_with = "lenient")]
    pub intent_summary: Option<String>,
    /// Sub-queries for the retriever
    #[serde(deserialize_with = "lenient")]
    pub skill_queries: Vec<String>,
    /// Answer for chat-only queries
    #[serde(deserialize_with = "lenient")]
    pub chat_response: Option<String>,
    /// Free-text rationale, logged only
    #[serde(deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}

impl Default for QueryAnalysis {
    fn default() -> Self {
        Self {
            needs_skills: true,
            intent_summary: None,
            skill_queries: Vec::new(),
            chat_response: None,
            reasoning: None,
        }
    }
}

/// Reflection verdict on the skills collected so far
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletenessEvaluation {
    /// Collected skills cover the task
    #[serde(deserialize_with = "lenient")]
    pub is_complete: bool,
    /// Capabilities still missing
    #[serde(deserialize_with = "lenient")]
    pub missing_capabilities: Vec<String>,
    /// Follow-up retrieval queries
    #[serde(deserialize_with = "lenient")]
    pub additional_queries: Vec<String>,
    /// Question for the user, see [`Self::clarification`]
    #[serde(deserialize_with = "lenient")]
    pub clarification_needed: Option<String>,
}

impl CompletenessEvaluation {
    /// Clarification text, ignoring blank strings
    pub fn clarification(&self) -> Option<&str> {
        self.clarification_needed
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Dependency graph proposed for the collected skills
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DagProposal {
    /// `dag[a]` lists the skills `a` depends on
    #[serde(deserialize_with = "lenient")]
    pub dag: SkillDag,
    /// Proposed order; nested lists run in parallel
    #[serde(deserialize_with = "lenient")]
    pub execution_order: Vec<ExecutionStep>,
    /// Optional narrowing of the candidate set
    #[serde(deserialize_with = "lenient")]
    pub filtered_skill_ids: Option<Vec<String>>,
    /// Free-text rationale, logged only
    #[serde(deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}

/// Per-skill verdict of a deep filter pass
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkillAssessment {
    /// `false` drops the skill; absent means executable
    #[serde(deserialize_with = "flag_or_true")]
    pub can_execute: bool,
    /// Why the skill was judged so
    #[serde(deserialize_with = "lenient")]
    pub reason: Option<String>,
}

impl Default for SkillAssessment {
    fn default() -> Self {
        Self {
            can_execute: true,
            reason: None,
        }
    }
}

/// Relevance filter over retrieved candidates
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkillFilter {
    /// `None` keeps every candidate
    #[serde(deserialize_with = "lenient")]
    pub filtered_skill_ids: Option<Vec<String>>,
    /// Deep pass only
    #[serde(deserialize_with = "lenient")]
    pub skill_analysis: BTreeMap<String, SkillAssessment>,
    /// Free-text rationale, logged only
    #[serde(deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}

/// One-shot selection over the whole catalog
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectSelection {
    /// False for chat-only queries
    #[serde(deserialize_with = "flag_or_true")]
    pub needs_skills: bool,
    /// Answer for chat-only queries
    #[serde(deserialize_with = "lenient")]
    pub chat_response: Option<String>,
    /// Chosen skills; unknown ids are dropped
    #[serde(deserialize_with = "lenient")]
    pub selected_skill_ids: Vec<String>,
    /// `dag[a]` lists the skills `a` depends on
    #[serde(deserialize_with = "lenient")]
    pub dag: SkillDag,
    /// Proposed order; nested lists run in parallel
    #[serde(deserialize_with = "lenient")]
    pub execution_order: Vec<ExecutionStep>,
    /// Free-text rationale, logged only
    #[serde(deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}

impl Default for DirectSelection {
    fn default() -> Self {
        Self {
            needs_skills: true,
            chat_response: None,
            selected_skill_ids: Vec::new(),
            dag: SkillDag::new(),
            execution_order: Vec::new(),
            reasoning: None,
        }
    }
}
