//! Model-guided execution with bounded repair.
//!
//! The model reads a skill's SKILL.md and answers with concrete commands.
//! A failing command is shown back to the model together with its output;
//! a proposed fix replaces the command for the next attempt. When the model
//! proposes nothing, the static [`ArtifactResolver`] choice runs instead,
//! with the same retry budget.

use crate::container::{clip_label, JsSource, SkillContainer};
use crate::runner::{ArtifactResolver, SkillArtifact};
use crate::types::{ExecutionInput, ExecutionOutput, ExecutionStatus, ExecutorKind};
use serde::Deserialize;
use serde_json::{Map, Value};
use skillweave_provider::reply::{flag_or_true, lenient, parse_response};
use skillweave_provider::LlmClient;
use skillweave_types::{ChatMessage, SkillRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Attempts per command, the first run included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const SKILL_CONTENT_CHARS: usize = 4000;
const FAILED_CODE_CHARS: usize = 8000;
const STDERR_CHARS: usize = 3000;
const STDOUT_CHARS: usize = 1000;
const LOG_CHARS: usize = 200;

/// How a generated command runs
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Script file under the skill directory
    PythonScript,
    /// Inline Python
    #[default]
    PythonCode,
    /// Shell command line
    Shell,
    /// Inline JavaScript
    #[serde(alias = "js")]
    JavaScript,
}

/// One command proposed by the model
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuidedCommand {
    /// Unknown kinds fall back to inline Python
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: CommandKind,
    /// Script path, relative to the skill directory
    #[serde(deserialize_with = "lenient")]
    pub path: Option<String>,
    /// Inline body; ignored when `path` is set
    #[serde(alias = "command", deserialize_with = "lenient")]
    pub code: String,
    /// Appended to the positional args, and exported upper-cased
    #[serde(deserialize_with = "lenient")]
    pub parameters: Map<String, Value>,
    /// Python packages for this command
    #[serde(deserialize_with = "lenient")]
    pub requirements: Vec<String>,
}

impl GuidedCommand {
    fn from_artifact(artifact: SkillArtifact) -> Self {
        match artifact {
            SkillArtifact::Script(path) => Self {
                kind: CommandKind::PythonScript,
                path: Some(path.display().to_string()),
                ..Self::default()
            },
            SkillArtifact::Python(code) => Self {
                kind: CommandKind::PythonCode,
                code,
                ..Self::default()
            },
            SkillArtifact::Shell(code) => Self {
                kind: CommandKind::Shell,
                code,
                ..Self::default()
            },
        }
    }
}

/// Reply to the command prompt
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandPlan {
    /// `false` means the skill cannot serve the query at all
    #[serde(deserialize_with = "flag_or_true")]
    pub can_handle: bool,
    /// Commands, run in order until one fails
    #[serde(deserialize_with = "lenient")]
    pub commands: Vec<GuidedCommand>,
    /// Packages needed by every command
    #[serde(alias = "required_packages", deserialize_with = "lenient")]
    pub requirements: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}

impl Default for CommandPlan {
    fn default() -> Self {
        Self {
            can_handle: true,
            commands: Vec::new(),
            requirements: Vec::new(),
            reasoning: None,
        }
    }
}

/// Diagnosis part of a repair reply
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ErrorAnalysis {
    #[serde(deserialize_with = "lenient")]
    pub error_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub root_cause: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub is_fixable: bool,
}

/// Reply to the repair prompt
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepairProposal {
    #[serde(deserialize_with = "lenient")]
    pub error_analysis: ErrorAnalysis,
    /// Full replacement body
    #[serde(deserialize_with = "lenient")]
    pub fixed_code: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub additional_requirements: Vec<String>,
}

impl RepairProposal {
    /// Replacement body, if the model judged the failure fixable
    pub fn fix(&self) -> Option<&str> {
        self.fixed_code
            .as_deref()
            .filter(|code| self.error_analysis.is_fixable && !code.trim().is_empty())
    }
}

/// Runs skills through model-generated commands, repairing failures
pub struct GuidedExecutor {
    llm: Arc<dyn LlmClient>,
    query: String,
    max_attempts: u32,
}

impl GuidedExecutor {
    /// Executor for `query`, with [`DEFAULT_MAX_ATTEMPTS`] per command
    pub fn new(llm: Arc<dyn LlmClient>, query: impl Into<String>) -> Self {
        Self {
            llm,
            query: query.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Attempts per command; at least one
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    async fn ask(&self, prompt: String) -> Option<String> {
        match self.llm.generate(&[ChatMessage::user(prompt)]).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Model call failed during guided execution: {}", e);
                None
            }
        }
    }

    /// Ask the model for the commands that carry out `skill`
    pub async fn plan_commands(&self, skill: &SkillRecord) -> CommandPlan {
        let prompt = command_prompt(&self.query, skill);
        let plan: CommandPlan = match self.ask(prompt).await {
            Some(reply) => parse_response(&reply),
            None => CommandPlan::default(),
        };
        info!(
            skill_id = %skill.id,
            can_handle = plan.can_handle,
            "Model proposed {} command(s)",
            plan.commands.len()
        );
        plan
    }

    /// Plan, run and repair `skill`; every attempt lands in the container log
    pub async fn run_skill(
        &self,
        container: &SkillContainer,
        skill: &SkillRecord,
        fallback: &dyn ArtifactResolver,
        input: ExecutionInput,
    ) -> ExecutionOutput {
        let plan = self.plan_commands(skill).await;
        if !plan.can_handle {
            let reason = plan.reasoning.as_deref().unwrap_or("no reason given");
            return container.record_failure(
                &skill.id,
                ExecutorKind::PythonCode,
                format!("Skill cannot handle query: {}", reason),
            );
        }

        let mut commands = plan.commands;
        if commands.is_empty() {
            match fallback.resolve(skill) {
                Some(artifact) => {
                    debug!(skill_id = %skill.id, "No commands proposed, using bundled artifact");
                    commands.push(GuidedCommand::from_artifact(artifact));
                }
                None => {
                    return container.record_failure(
                        &skill.id,
                        ExecutorKind::PythonCode,
                        "No execution commands generated",
                    )
                }
            }
        }

        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            let prepared = command_input(container, skill, &command, &plan.requirements, &input);
            let output = self.run_with_repair(container, skill, command, prepared).await;
            let failed = output.exit_code != 0;
            outputs.push(output);
            if failed {
                break;
            }
        }
        merge_outputs(outputs)
    }

    async fn run_with_repair(
        &self,
        container: &SkillContainer,
        skill: &SkillRecord,
        mut command: GuidedCommand,
        mut input: ExecutionInput,
    ) -> ExecutionOutput {
        let skill_id = skill.id.as_str();
        let mut attempt = 1;
        loop {
            info!(skill_id, "Execution attempt {}/{}", attempt, self.max_attempts);
            let output = run_command(container, skill, &command, input.clone()).await;

            let status = container
                .last_record(skill_id)
                .map(|r| r.status)
                .unwrap_or(ExecutionStatus::Failed);
            if status == ExecutionStatus::Success {
                if attempt > 1 {
                    info!(skill_id, "Execution succeeded after {} attempts", attempt);
                }
                return output;
            }
            if status == ExecutionStatus::SecurityBlocked {
                warn!(skill_id, "Command blocked by the security screen, not retrying");
                return output;
            }

            warn!(
                skill_id,
                "Attempt {} failed: {}",
                attempt,
                clip_label(output.stderr.trim(), LOG_CHARS)
            );
            if attempt >= self.max_attempts {
                error!(skill_id, "All {} attempts failed", self.max_attempts);
                return output;
            }

            match failed_code(skill, &command).await {
                Some(code) => {
                    let prompt = repair_prompt(&self.query, skill, &code, &output, attempt, self.max_attempts);
                    let proposal: RepairProposal = match self.ask(prompt).await {
                        Some(reply) => parse_response(&reply),
                        None => RepairProposal::default(),
                    };
                    info!(
                        skill_id,
                        error_type = proposal.error_analysis.error_type.as_deref().unwrap_or("unknown"),
                        fixable = proposal.error_analysis.is_fixable,
                        "Error analysis"
                    );
                    if let Some(fix) = proposal.fix() {
                        info!(skill_id, "Applying fix");
                        command = command.with_code(fix);
                    }
                    for requirement in proposal.additional_requirements {
                        if !input.requirements.contains(&requirement) {
                            info!(skill_id, "Adding requirement {}", requirement);
                            input.requirements.push(requirement);
                        }
                    }
                }
                None => debug!(skill_id, "Retrying without modification"),
            }
            attempt += 1;
        }
    }
}

impl GuidedCommand {
    /// Inline form of this command with `code` as its body
    fn with_code(mut self, code: &str) -> Self {
        if let Some(path) = self.path.take() {
            self.kind = match Path::new(&path).extension().and_then(|e| e.to_str()) {
                Some("sh") | Some("bash") => CommandKind::Shell,
                Some("js") | Some("mjs") => CommandKind::JavaScript,
                _ => CommandKind::PythonCode,
            };
        }
        self.code = code.to_string();
        self
    }
}

fn skill_file(skill: &SkillRecord, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    match &skill.path {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

async fn run_command(
    container: &SkillContainer,
    skill: &SkillRecord,
    command: &GuidedCommand,
    input: ExecutionInput,
) -> ExecutionOutput {
    let skill_id = skill.id.as_str();
    if let Some(path) = command.path.as_deref().filter(|p| !p.trim().is_empty()) {
        return container.run_script(skill_id, skill_file(skill, path), input).await;
    }
    match command.kind {
        CommandKind::Shell => container.run_shell(skill_id, &command.code, input).await,
        CommandKind::JavaScript => {
            container
                .run_javascript(skill_id, JsSource::Code(command.code.clone()), None, input)
                .await
        }
        CommandKind::PythonScript | CommandKind::PythonCode => {
            container.run_inline_code(skill_id, &command.code, input).await
        }
    }
}

/// Body shown to the model for repair; script files are read from disk
async fn failed_code(skill: &SkillRecord, command: &GuidedCommand) -> Option<String> {
    let code = match command.path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => {
            let file = skill_file(skill, path);
            tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| debug!("Cannot read {}: {}", file.display(), e))
                .ok()?
        }
        None => command.code.clone(),
    };
    (!code.trim().is_empty()).then_some(code)
}

/// `input` plus the command's parameters, `SKILL_DIR` and merged requirements
fn command_input(
    container: &SkillContainer,
    skill: &SkillRecord,
    command: &GuidedCommand,
    plan_requirements: &[String],
    input: &ExecutionInput,
) -> ExecutionInput {
    let mut merged = input.clone();
    for (key, value) in &command.parameters {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        merged.args.push(text.clone());
        merged.env_vars.insert(key.to_ascii_uppercase(), text);
        merged.kwargs.insert(key.clone(), value.clone());
    }

    let skill_dir = container
        .skill_sandbox_path(&skill.id)
        .or_else(|| skill.path.as_ref().map(|p| p.display().to_string()));
    if let Some(dir) = skill_dir {
        merged.env_vars.insert("SKILL_DIR".to_string(), dir);
    }

    let mut requirements = plan_requirements.to_vec();
    requirements.extend(command.requirements.iter().cloned());
    requirements.append(&mut merged.requirements);
    merged.requirements = Vec::with_capacity(requirements.len());
    for requirement in requirements {
        if !merged.requirements.contains(&requirement) {
            merged.requirements.push(requirement);
        }
    }
    merged
}

/// Concatenated stdout/stderr, first non-zero exit code, summed durations
pub fn merge_outputs(mut outputs: Vec<ExecutionOutput>) -> ExecutionOutput {
    if outputs.len() <= 1 {
        return outputs.pop().unwrap_or_default();
    }

    let join = |pick: fn(&ExecutionOutput) -> &str| {
        outputs
            .iter()
            .map(pick)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    };
    let mut merged = ExecutionOutput {
        stdout: join(|o| o.stdout.as_str()),
        stderr: join(|o| o.stderr.as_str()),
        exit_code: outputs.iter().map(|o| o.exit_code).find(|c| *c != 0).unwrap_or(0),
        duration_ms: outputs.iter().map(|o| o.duration_ms).sum(),
        ..ExecutionOutput::default()
    };
    for output in outputs {
        merged.output_files.extend(output.output_files);
        merged.artifacts.extend(output.artifacts);
        if output.return_value.is_some() {
            merged.return_value = output.return_value;
        }
    }
    merged
}

fn file_names(files: &[skillweave_types::SkillFile]) -> String {
    if files.is_empty() {
        return "None".to_string();
    }
    files
        .iter()
        .map(|f| f.path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn command_prompt(query: &str, skill: &SkillRecord) -> String {
    let content = clip_label(skill.content.as_deref().unwrap_or(""), SKILL_CONTENT_CHARS);
    format!(
        r#"You are preparing the execution of a skill for a user query.

User Query: {query}

Skill ID: {id}
Name: {name}
Description: {description}

Skill Content (SKILL.md):
{content}

Scripts: {scripts}
References: {references}
Resources: {resources}

Decide whether this skill can serve the query, then write the commands that carry it out.

Respond with JSON only:
{{
    "can_handle": true,
    "commands": [
        {{
            "type": "python_script|python_code|shell|javascript",
            "path": "script path relative to the skill directory, or null",
            "code": "inline code when there is no path",
            "parameters": {{"name": "value"}},
            "requirements": ["package"]
        }}
    ],
    "requirements": ["package"],
    "reasoning": "brief explanation"
}}

Parameters are passed as positional arguments and as upper-cased environment variables. Write output files under $SKILL_OUTPUT_DIR."#,
        id = skill.id,
        name = skill.name,
        description = skill.description,
        scripts = file_names(&skill.scripts),
        references = file_names(&skill.references),
        resources = file_names(&skill.resources),
    )
}

fn repair_prompt(
    query: &str,
    skill: &SkillRecord,
    code: &str,
    output: &ExecutionOutput,
    attempt: u32,
    max_attempts: u32,
) -> String {
    format!(
        r#"A skill command failed. Analyze the error and fix the code.

User Query: {query}
Skill: {id} ({name})
Attempt: {attempt}/{max_attempts}

Failed Code:
{code}

Exit Code: {exit_code}

Stderr:
{stderr}

Stdout:
{stdout}

Respond with JSON only:
{{
    "error_analysis": {{
        "error_type": "syntax|import|runtime|environment|other",
        "root_cause": "brief description",
        "is_fixable": true
    }},
    "fixed_code": "the complete corrected code",
    "additional_requirements": ["package"]
}}

Set "is_fixable" to false when the failure cannot be fixed by changing the code."#,
        id = skill.id,
        name = skill.name,
        code = clip_label(code, FAILED_CODE_CHARS),
        exit_code = output.exit_code,
        stderr = clip_label(&output.stderr, STDERR_CHARS),
        stdout = clip_label(&output.stdout, STDOUT_CHARS),
    )
}
