//! Execution log: every record of a container, plus linked upstream outputs

use crate::types::{short_id, ExecutionOutput, ExecutionRecord, ExecutionStatus};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_TITLE: &str = "Skill Execution Spec";

/// Ordered log of the executions performed in one container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSpec {
    pub spec_id: String,
    pub title: String,
    pub description: String,
    pub records: Vec<ExecutionRecord>,
    pub created_at: DateTime<Local>,
    /// skill id → output it published for downstream skills
    pub upstream_outputs: BTreeMap<String, ExecutionOutput>,
}

impl Default for ExecutionSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionSpec {
    pub fn new() -> Self {
        Self {
            spec_id: short_id(),
            title: DEFAULT_TITLE.to_string(),
            description: String::new(),
            records: Vec::new(),
            created_at: Local::now(),
            upstream_outputs: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_record(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    /// Output of the execution with `execution_id`
    pub fn get_output(&self, execution_id: &str) -> Option<&ExecutionOutput> {
        self.records
            .iter()
            .find(|r| r.execution_id == execution_id)
            .map(|r| &r.output)
    }

    /// Publish `output` under `skill_id`, replacing any earlier entry
    pub fn link_upstream(&mut self, skill_id: impl Into<String>, output: ExecutionOutput) {
        self.upstream_outputs.insert(skill_id.into(), output);
    }

    pub fn upstream(&self, skill_id: &str) -> Option<&ExecutionOutput> {
        self.upstream_outputs.get(skill_id)
    }

    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# {}", self.title),
            String::new(),
            format!("**Spec ID**: `{}`", self.spec_id),
            format!("**Created**: {}", self.created_at.to_rfc3339()),
            String::new(),
        ];

        if !self.description.is_empty() {
            lines.push(self.description.clone());
            lines.push(String::new());
        }

        lines.extend([
            "## Summary".to_string(),
            String::new(),
            format!("- **Total Executions**: {}", self.records.len()),
            format!("- **Successful**: {}", self.count(ExecutionStatus::Success)),
            format!("- **Failed**: {}", self.count(ExecutionStatus::Failed)),
            format!(
                "- **Security Blocked**: {}",
                self.count(ExecutionStatus::SecurityBlocked)
            ),
            format!("- **Timed Out**: {}", self.count(ExecutionStatus::Timeout)),
            String::new(),
            "---".to_string(),
            String::new(),
            "## Execution Records".to_string(),
            String::new(),
        ]);

        for record in &self.records {
            lines.push(record.to_markdown());
            lines.push("---".to_string());
            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// Write the markdown report to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_markdown())
    }
}
