//! Executes a planned skill DAG step by step inside one container.
//!
//! Each skill sees the outputs of its direct dependencies through
//! `UPSTREAM_OUTPUTS` (JSON keyed by skill id) and, per dependency with
//! output, `UPSTREAM_<ID>_STDOUT`.
//!
//! Without a [`GuidedExecutor`] each skill runs the artifact its
//! [`ArtifactResolver`] picks, once. With one, the model writes the commands
//! and failed attempts are repaired and retried.

use crate::container::{SkillContainer, ALLOWED_SCRIPT_EXTENSIONS};
use crate::error::ExecutorError;
use crate::guided::GuidedExecutor;
use crate::types::{ExecutionInput, ExecutionOutput, ExecutionStatus, ExecutorKind};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use skillweave_types::{ExecutionStep, SkillDag, SkillDagResult, SkillRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Characters of upstream stdout exposed per dependency
pub const UPSTREAM_STDOUT_CHARS: usize = 4096;

const SKILL_FILE: &str = "SKILL.md";

/// What to run for a skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillArtifact {
    /// Script file, executor chosen by extension
    Script(PathBuf),
    /// Inline Python
    Python(String),
    /// Inline shell
    Shell(String),
}

/// Picks the executable artifact of a skill
pub trait ArtifactResolver: Send + Sync {
    fn resolve(&self, skill: &SkillRecord) -> Option<SkillArtifact>;
}

/// First bundled script with a runnable extension, else the first
/// `python`/`bash`/`sh` code block of SKILL.md.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl ArtifactResolver for DefaultResolver {
    fn resolve(&self, skill: &SkillRecord) -> Option<SkillArtifact> {
        if let Some(script) = skill.first_script_with(ALLOWED_SCRIPT_EXTENSIONS) {
            let path = match &skill.path {
                Some(dir) if script.path.is_relative() => dir.join(&script.path),
                _ => script.path.clone(),
            };
            return Some(SkillArtifact::Script(path));
        }

        let content = match &skill.content {
            Some(content) => content.clone(),
            None => {
                let path = skill.path.as_ref()?.join(SKILL_FILE);
                std::fs::read_to_string(&path)
                    .map_err(|e| debug!("Cannot read {}: {}", path.display(), e))
                    .ok()?
            }
        };
        first_code_block(&content)
    }
}

/// First fenced block tagged `python`, `bash` or `sh`
pub fn first_code_block(markdown: &str) -> Option<SkillArtifact> {
    let mut lines = markdown.lines();
    while let Some(line) = lines.next() {
        let Some(tag) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        let tag = tag.trim().to_ascii_lowercase();
        let is_python = tag == "python";
        if !is_python && tag != "bash" && tag != "sh" {
            continue;
        }

        let body = lines
            .by_ref()
            .take_while(|l| !l.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n");
        return Some(if is_python {
            SkillArtifact::Python(body)
        } else {
            SkillArtifact::Shell(body)
        });
    }
    None
}

/// Environment-safe form of a skill id
pub fn env_key(skill_id: &str) -> String {
    skill_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Outcome of one skill in a DAG run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillRunResult {
    pub skill_id: String,
    pub success: bool,
    pub status: ExecutionStatus,
    pub output: ExecutionOutput,
    pub error: Option<String>,
}

/// Outcome of a whole DAG run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DagRunReport {
    pub success: bool,
    pub results: BTreeMap<String, SkillRunResult>,
    /// Steps actually started, in order
    pub executed_order: Vec<ExecutionStep>,
    pub total_duration_ms: f64,
}

impl DagRunReport {
    pub fn output(&self, skill_id: &str) -> Option<&ExecutionOutput> {
        self.results.get(skill_id).map(|r| &r.output)
    }
}

/// Runs [`SkillDagResult`]s through a shared container
pub struct SkillDagRunner {
    container: Arc<SkillContainer>,
    resolver: Arc<dyn ArtifactResolver>,
    guide: Option<Arc<GuidedExecutor>>,
    stop_on_failure: bool,
}

impl SkillDagRunner {
    pub fn new(container: Arc<SkillContainer>) -> Self {
        Self {
            container,
            resolver: Arc::new(DefaultResolver),
            guide: None,
            stop_on_failure: true,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ArtifactResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Let the model write and repair each skill's commands; the resolver
    /// stays as the fallback when the model proposes none
    pub fn with_guide(mut self, guide: GuidedExecutor) -> Self {
        self.guide = Some(Arc::new(guide));
        self
    }

    pub fn with_stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn container(&self) -> &Arc<SkillContainer> {
        &self.container
    }

    /// `base` with the outputs of `skill_id`'s dependencies injected
    fn upstream_input(&self, skill_id: &str, dag: &SkillDag, base: &ExecutionInput) -> ExecutionInput {
        let mut input = base.clone();
        let mut upstream = Map::new();

        for dep in dag.get(skill_id).into_iter().flatten() {
            let Some(output) = self.container.upstream_output(dep) else {
                continue;
            };
            if !output.stdout.is_empty() {
                let head: String = output.stdout.chars().take(UPSTREAM_STDOUT_CHARS).collect();
                input
                    .env_vars
                    .insert(format!("UPSTREAM_{}_STDOUT", env_key(dep)), head);
            }
            upstream.insert(dep.clone(), output.to_upstream_json());
        }

        if !upstream.is_empty() {
            input
                .env_vars
                .insert("UPSTREAM_OUTPUTS".to_string(), Value::Object(upstream).to_string());
        }
        input
    }

    async fn run_skill(
        &self,
        skill_id: &str,
        plan: &SkillDagResult,
        base: &ExecutionInput,
    ) -> SkillRunResult {
        let Some(skill) = plan.selected_skills.get(skill_id) else {
            let message = ExecutorError::UnknownSkill(skill_id.to_string()).to_string();
            warn!("{}", message);
            return SkillRunResult {
                skill_id: skill_id.to_string(),
                success: false,
                status: ExecutionStatus::Failed,
                output: ExecutionOutput::failure(message.clone()),
                error: Some(message),
            };
        };

        if let Some(dir) = &skill.path {
            if let Err(e) = self.container.mount_skill_directory(skill_id, dir) {
                warn!("Cannot mount directory of skill '{}': {}", skill_id, e);
            }
        }

        let input = self.upstream_input(skill_id, &plan.dag, base);
        let output = match &self.guide {
            Some(guide) => {
                guide
                    .run_skill(&self.container, skill, self.resolver.as_ref(), input)
                    .await
            }
            None => match self.resolver.resolve(skill) {
                Some(SkillArtifact::Script(path)) => {
                    self.container.run_script(skill_id, &path, input).await
                }
                Some(SkillArtifact::Python(code)) => {
                    self.container.run_inline_code(skill_id, &code, input).await
                }
                Some(SkillArtifact::Shell(command)) => {
                    self.container.run_shell(skill_id, &command, input).await
                }
                None => self.container.record_failure(
                    skill_id,
                    ExecutorKind::PythonCode,
                    format!("No executable artifact for skill '{}'", skill_id),
                ),
            },
        };
        self.container.link_upstream(skill_id, output.clone());

        let record = self.container.last_record(skill_id);
        let status = record.as_ref().map(|r| r.status).unwrap_or(if output.exit_code == 0 {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        });
        let success = status == ExecutionStatus::Success;
        let error = record
            .and_then(|r| r.error_message)
            .or_else(|| (!success).then(|| output.stderr.clone()));

        SkillRunResult {
            skill_id: skill_id.to_string(),
            success,
            status,
            output,
            error,
        }
    }

    /// Run `plan.execution_order`; parallel groups run concurrently
    pub async fn run(&self, plan: &SkillDagResult, base: &ExecutionInput) -> DagRunReport {
        let started = Instant::now();
        let mut report = DagRunReport {
            success: true,
            ..DagRunReport::default()
        };

        for step in &plan.execution_order {
            let results = match step {
                ExecutionStep::Single(id) => vec![self.run_skill(id, plan, base).await],
                ExecutionStep::Parallel(ids) => {
                    debug!("Running parallel group {:?}", ids);
                    join_all(ids.iter().map(|id| self.run_skill(id, plan, base))).await
                }
            };
            report.executed_order.push(step.clone());

            let step_ok = results.iter().all(|r| r.success);
            for result in results {
                report.results.insert(result.skill_id.clone(), result);
            }

            if !step_ok {
                report.success = false;
                if self.stop_on_failure {
                    warn!("Stopping DAG run after failed step {:?}", step.ids());
                    break;
                }
            }
        }

        report.total_duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            success = report.success,
            executed = report.results.len(),
            duration_ms = report.total_duration_ms,
            "DAG run finished"
        );
        report
    }
}
