//! Execution data model: inputs, outputs and per-call records

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Characters of stdout/stderr shown in a record's markdown
pub const PREVIEW_CHARS: usize = 1000;

/// How an artifact is executed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    PythonScript,
    PythonCode,
    #[serde(alias = "python_function")]
    Function,
    Shell,
    #[serde(alias = "js")]
    JavaScript,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PythonScript => "python_script",
            Self::PythonCode => "python_code",
            Self::Function => "function",
            Self::Shell => "shell",
            Self::JavaScript => "javascript",
        }
    }

    /// Kind implied by a script extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Self::PythonScript),
            "sh" | "bash" => Some(Self::Shell),
            "js" | "mjs" => Some(Self::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one execution call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
    SecurityBlocked,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::SecurityBlocked => "security_blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied input for one execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionInput {
    /// Positional arguments (`sys.argv[1:]`, `process.argv`)
    pub args: Vec<String>,
    /// Keyword arguments, used by function calls
    pub kwargs: Map<String, Value>,
    pub env_vars: BTreeMap<String, String>,
    /// Files staged into the workspace `inputs/` directory before running
    pub input_files: BTreeMap<String, PathBuf>,
    pub stdin: Option<String>,
    pub working_dir: Option<PathBuf>,
    /// Python packages installed before running
    pub requirements: Vec<String>,
}

impl ExecutionInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn with_input_file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.input_files.insert(name.into(), path.into());
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = requirements.into_iter().map(Into::into).collect();
        self
    }
}

/// What an execution produced
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutput {
    /// Only set by in-process function calls
    pub return_value: Option<Value>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Files created or modified in `outputs/`, by file name
    pub output_files: BTreeMap<String, PathBuf>,
    pub artifacts: BTreeMap<String, Value>,
    pub duration_ms: f64,
}

impl ExecutionOutput {
    /// Output of a call that never ran or crashed before producing anything
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: -1,
            ..Self::default()
        }
    }

    /// Upstream payload handed to dependent skills
    pub fn to_upstream_json(&self) -> Value {
        serde_json::json!({
            "stdout": self.stdout,
            "stderr": self.stderr,
            "return_value": self.return_value,
            "exit_code": self.exit_code,
            "output_files": self
                .output_files
                .iter()
                .map(|(name, path)| (name.clone(), Value::from(path.display().to_string())))
                .collect::<Map<String, Value>>(),
        })
    }
}

/// One execution attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub skill_id: String,
    pub executor: ExecutorKind,
    /// Script path, `<inline>`, or the head of a shell command
    pub script_path: Option<String>,
    pub function_name: Option<String>,
    pub input: ExecutionInput,
    pub output: ExecutionOutput,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub error_message: Option<String>,
    pub sandbox_used: bool,
}

/// Short random id, as used for executions and specs
pub(crate) fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl ExecutionRecord {
    /// Pending record for `skill_id`
    pub fn new(skill_id: impl Into<String>, executor: ExecutorKind, input: ExecutionInput) -> Self {
        Self {
            execution_id: short_id(),
            skill_id: skill_id.into(),
            executor,
            script_path: None,
            function_name: None,
            input,
            output: ExecutionOutput::default(),
            status: ExecutionStatus::Pending,
            start_time: None,
            end_time: None,
            error_message: None,
            sandbox_used: false,
        }
    }

    /// Mark running and stamp the start time
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.start_time = Some(Local::now());
    }

    /// Move to a terminal status with the final output
    pub fn finish(&mut self, status: ExecutionStatus, output: ExecutionOutput, error: Option<String>) {
        self.status = status;
        self.output = output;
        self.error_message = error;
        self.end_time = Some(Local::now());
    }

    /// Markdown section for the execution report
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("### Execution: `{}`", self.execution_id),
            String::new(),
            format!("- **Skill ID**: `{}`", self.skill_id),
            format!("- **Executor**: `{}`", self.executor),
            format!("- **Status**: `{}`", self.status),
            format!(
                "- **Sandbox**: `{}`",
                if self.sandbox_used { "Yes" } else { "No" }
            ),
        ];

        if let Some(script) = &self.script_path {
            lines.push(format!("- **Script**: `{}`", script));
        }
        if let Some(function) = &self.function_name {
            lines.push(format!("- **Function**: `{}`", function));
        }
        if let Some(start) = &self.start_time {
            lines.push(format!("- **Start Time**: `{}`", start.to_rfc3339()));
        }
        if let Some(end) = &self.end_time {
            lines.push(format!("- **End Time**: `{}`", end.to_rfc3339()));
        }
        lines.push(format!("- **Duration**: `{:.2}ms`", self.output.duration_ms));

        lines.extend(["", "#### Input", ""].map(String::from));
        if !self.input.args.is_empty() {
            lines.push(format!("- **Args**: `{:?}`", self.input.args));
        }
        if !self.input.kwargs.is_empty() {
            lines.push(format!("- **Kwargs**: `{}`", Value::Object(self.input.kwargs.clone())));
        }
        if !self.input.input_files.is_empty() {
            lines.push("- **Input Files**:".to_string());
            for (name, path) in &self.input.input_files {
                lines.push(format!("  - `{}`: `{}`", name, path.display()));
            }
        }
        if !self.input.requirements.is_empty() {
            lines.push(format!("- **Requirements**: `{:?}`", self.input.requirements));
        }

        lines.extend(["", "#### Output", ""].map(String::from));
        lines.push(format!("- **Exit Code**: `{}`", self.output.exit_code));
        if !self.output.stdout.is_empty() {
            lines.extend(["", "**stdout**:", "```"].map(String::from));
            lines.push(preview(&self.output.stdout).to_string());
            lines.push("```".to_string());
        }
        if !self.output.stderr.is_empty() {
            lines.extend(["", "**stderr**:", "```"].map(String::from));
            lines.push(preview(&self.output.stderr).to_string());
            lines.push("```".to_string());
        }
        if !self.output.output_files.is_empty() {
            lines.push("- **Output Files**:".to_string());
            for (name, path) in &self.output.output_files {
                lines.push(format!("  - `{}`: `{}`", name, path.display()));
            }
        }

        if let Some(error) = &self.error_message {
            lines.extend(["", "#### Error", ""].map(String::from));
            lines.push(format!("```\n{}\n```", error));
        }

        lines.push(String::new());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(ExecutorKind::from_extension("py"), Some(ExecutorKind::PythonScript));
        assert_eq!(ExecutorKind::from_extension("BASH"), Some(ExecutorKind::Shell));
        assert_eq!(ExecutorKind::from_extension("mjs"), Some(ExecutorKind::JavaScript));
        assert_eq!(ExecutorKind::from_extension("rb"), None);
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&ExecutionStatus::SecurityBlocked).unwrap_or_default();
        assert_eq!(json, "\"security_blocked\"");
        assert!(ExecutionStatus::Timeout.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_record_lifecycle() {
        let mut record = ExecutionRecord::new("pdf", ExecutorKind::Shell, ExecutionInput::new());
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert_eq!(record.execution_id.len(), 8);

        record.start();
        assert_eq!(record.status, ExecutionStatus::Running);
        record.finish(ExecutionStatus::Failed, ExecutionOutput::failure("boom"), Some("boom".into()));
        assert!(record.end_time >= record.start_time);
        assert_eq!(record.output.exit_code, -1);
    }

    #[test]
    fn test_record_markdown() {
        let input = ExecutionInput::new().with_args(["a.pdf"]).with_requirements(["pypdf"]);
        let mut record = ExecutionRecord::new("pdf", ExecutorKind::PythonScript, input);
        record.script_path = Some("scripts/extract.py".into());
        record.start();
        let output = ExecutionOutput {
            stdout: "x".repeat(PREVIEW_CHARS + 50),
            duration_ms: 12.345,
            ..ExecutionOutput::default()
        };
        record.finish(ExecutionStatus::Success, output, None);

        let md = record.to_markdown();
        assert!(md.starts_with(&format!("### Execution: `{}`", record.execution_id)));
        assert!(md.contains("- **Executor**: `python_script`"));
        assert!(md.contains("- **Sandbox**: `No`"));
        assert!(md.contains("- **Duration**: `12.35ms`"));
        assert!(md.contains("- **Args**: `[\"a.pdf\"]`"));
        assert!(md.contains(&format!("```\n{}\n```", "x".repeat(PREVIEW_CHARS))));
        assert!(!md.contains("#### Error"));
    }

    #[test]
    fn test_upstream_json() {
        let mut output = ExecutionOutput {
            stdout: "rows=3".into(),
            ..ExecutionOutput::default()
        };
        output.output_files.insert("t.csv".into(), PathBuf::from("/w/outputs/t.csv"));
        let json = output.to_upstream_json();
        assert_eq!(json["stdout"], "rows=3");
        assert_eq!(json["output_files"]["t.csv"], "/w/outputs/t.csv");
        assert!(json["return_value"].is_null());
    }
}
