//! Skill container: one workspace, one backend, one execution log.
//!
//! Every run goes through the same steps: security screen, environment
//! preamble, dispatch to the backend, output collection, and a record
//! appended to the container's [`ExecutionSpec`]. Failures of the executed
//! code never surface as `Err`; they are recorded and returned as output.

use crate::backend::{DockerBackend, DockerConfig, ExecutionBackend, Launch, LocalBackend, Mount};
use crate::error::{ExecutorError, Result};
use crate::preamble::{js_preamble, python_preamble, shell_with_exports, WorkspaceView, SANDBOX_ROOT};
use crate::report::ExecutionSpec;
use crate::security;
use crate::types::{
    short_id, ExecutionInput, ExecutionOutput, ExecutionRecord, ExecutionStatus, ExecutorKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Extensions accepted for script files
pub const ALLOWED_SCRIPT_EXTENSIONS: &[&str] = &["py", "sh", "bash", "js", "mjs"];

/// Characters of a shell command kept as the record's target
const COMMAND_LABEL_CHARS: usize = 200;

const REPORT_FILE: &str = "execution_spec.md";

/// In-process callable: positional args and keyword args to a JSON value
pub type SkillFunction =
    Arc<dyn Fn(&[String], &Map<String, Value>) -> std::result::Result<Value, String> + Send + Sync>;

/// Container settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerConfig {
    /// Workspace directory; a temporary one is created when unset
    pub workspace: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Run through Docker instead of on the host
    pub use_sandbox: bool,
    pub enable_security_check: bool,
    pub docker: DockerConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            timeout_secs: 300,
            use_sandbox: true,
            enable_security_check: true,
            docker: DockerConfig::default(),
        }
    }
}

impl ContainerConfig {
    /// Host execution, no Docker
    pub fn local() -> Self {
        Self {
            use_sandbox: false,
            ..Self::default()
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// JavaScript body: a file or inline code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsSource {
    Path(PathBuf),
    Code(String),
}

/// One call for [`SkillContainer::execute`]
#[derive(Clone)]
pub enum ExecutionRequest {
    PythonScript {
        skill_id: String,
        path: PathBuf,
        input: ExecutionInput,
    },
    PythonCode {
        skill_id: String,
        code: String,
        input: ExecutionInput,
    },
    Function {
        skill_id: String,
        name: String,
        func: SkillFunction,
        input: ExecutionInput,
    },
    Shell {
        skill_id: String,
        command: String,
        input: ExecutionInput,
    },
    JavaScript {
        skill_id: String,
        source: JsSource,
        /// Defaults to the backend's node binary
        runtime: Option<String>,
        input: ExecutionInput,
    },
}

impl ExecutionRequest {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Self::PythonScript { .. } => ExecutorKind::PythonScript,
            Self::PythonCode { .. } => ExecutorKind::PythonCode,
            Self::Function { .. } => ExecutorKind::Function,
            Self::Shell { .. } => ExecutorKind::Shell,
            Self::JavaScript { .. } => ExecutorKind::JavaScript,
        }
    }
}

#[derive(Default)]
struct ContainerState {
    spec: ExecutionSpec,
    skill_dirs: BTreeMap<String, PathBuf>,
}

/// Paths and environment for one run, in the backend's view
struct RunContext {
    view: WorkspaceView,
    cwd: String,
    skill_dir: Option<String>,
    env: BTreeMap<String, String>,
}

/// Executes skill artifacts inside a managed workspace
pub struct SkillContainer {
    workspace: PathBuf,
    config: ContainerConfig,
    backend: Arc<dyn ExecutionBackend>,
    state: Mutex<ContainerState>,
    /// Serializes sandbox runs: one sandbox per workspace
    sandbox_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SkillContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillContainer")
            .field("workspace", &self.workspace)
            .field("backend", &self.backend.name())
            .finish()
    }
}

pub(crate) fn clip_label(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// name → mtime of every file in `dir`
fn snapshot(dir: &Path) -> BTreeMap<String, Option<SystemTime>> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return BTreeMap::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| {
            let mtime = e.metadata().and_then(|m| m.modified()).ok();
            (e.file_name().to_string_lossy().into_owned(), mtime)
        })
        .collect()
}

/// Files in `dir` that are new or modified since `before`
fn collect_outputs(
    dir: &Path,
    before: &BTreeMap<String, Option<SystemTime>>,
) -> BTreeMap<String, PathBuf> {
    snapshot(dir)
        .into_iter()
        .filter(|(name, mtime)| before.get(name) != Some(mtime))
        .map(|(name, _)| {
            let path = dir.join(&name);
            (name, path)
        })
        .collect()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "function panicked".to_string()
    }
}

impl SkillContainer {
    /// Create the workspace and pick the backend from `config`
    pub fn new(config: ContainerConfig) -> Result<Self> {
        let requested = config
            .workspace
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("skill_container_{}", short_id())));
        std::fs::create_dir_all(&requested)?;
        let workspace = requested.canonicalize()?;
        for sub in ["outputs", "scripts", "logs", "inputs"] {
            std::fs::create_dir_all(workspace.join(sub))?;
        }

        let backend: Arc<dyn ExecutionBackend> = if config.use_sandbox {
            Arc::new(DockerBackend::new(config.docker.clone()))
        } else {
            warn!(
                "Skill container running in local mode; scripts execute directly on this machine"
            );
            Arc::new(LocalBackend)
        };

        info!(
            "Skill container initialized at {} [backend: {}]",
            workspace.display(),
            backend.name()
        );

        Ok(Self {
            workspace,
            config,
            backend,
            state: Mutex::new(ContainerState::default()),
            sandbox_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Replace the execution backend
    pub fn with_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        info!("Skill container backend set to {}", backend.name());
        self.backend = backend;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn output_dir(&self) -> PathBuf {
        self.workspace.join("outputs")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.workspace.join("scripts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.workspace.join("logs")
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.workspace.join("inputs")
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_sandboxed(&self) -> bool {
        self.backend.is_isolated()
    }

    fn lock(&self) -> MutexGuard<'_, ContainerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a skill's resource directory
    pub fn mount_skill_directory(&self, skill_id: &str, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref().canonicalize()?;
        debug!("Mounting skill '{}' from {}", skill_id, dir.display());
        self.lock().skill_dirs.insert(skill_id.to_string(), dir);
        Ok(())
    }

    /// Where a mounted skill directory is visible to executed code
    pub fn skill_sandbox_path(&self, skill_id: &str) -> Option<String> {
        let host = self.lock().skill_dirs.get(skill_id).cloned()?;
        Some(self.backend.skill_mount_path(skill_id, &host))
    }

    // ---- Execution log ---------------------------------------------------

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.lock().spec.records.clone()
    }

    /// Most recent record for `skill_id`
    pub fn last_record(&self, skill_id: &str) -> Option<ExecutionRecord> {
        self.lock()
            .spec
            .records
            .iter()
            .rev()
            .find(|r| r.skill_id == skill_id)
            .cloned()
    }

    /// Record a failed execution that never reached dispatch
    pub fn record_failure(
        &self,
        skill_id: &str,
        kind: ExecutorKind,
        message: impl std::fmt::Display,
    ) -> ExecutionOutput {
        let record = self.start_record(skill_id, kind, None, ExecutionInput::default());
        self.fail(record, message)
    }

    /// Snapshot of the execution log
    pub fn spec(&self) -> ExecutionSpec {
        self.lock().spec.clone()
    }

    pub fn get_output(&self, execution_id: &str) -> Option<ExecutionOutput> {
        self.lock().spec.get_output(execution_id).cloned()
    }

    /// Publish `output` for downstream skills
    pub fn link_upstream(&self, skill_id: &str, output: ExecutionOutput) {
        self.lock().spec.link_upstream(skill_id, output);
    }

    pub fn upstream_output(&self, skill_id: &str) -> Option<ExecutionOutput> {
        self.lock().spec.upstream(skill_id).cloned()
    }

    /// Value published by `upstream_id`.
    ///
    /// `field` selects `return_value`, `stdout`, `stderr`, `exit_code`,
    /// `output_files`, or `output` for the whole output. Without a field,
    /// the return value is preferred over stdout.
    pub fn link_skills(&self, upstream_id: &str, field: Option<&str>) -> Option<Value> {
        let output = self.upstream_output(upstream_id)?;
        match field {
            None => Some(
                output
                    .return_value
                    .filter(|v| !v.is_null())
                    .unwrap_or(Value::String(output.stdout)),
            ),
            Some("return_value") => Some(output.return_value.unwrap_or(Value::Null)),
            Some("stdout") => Some(Value::String(output.stdout)),
            Some("stderr") => Some(Value::String(output.stderr)),
            Some("exit_code") => Some(Value::from(output.exit_code)),
            Some("output_files") => Some(output.to_upstream_json()["output_files"].clone()),
            Some("output") => serde_json::to_value(&output).ok(),
            Some(other) => {
                debug!("Unknown output field '{}' requested from '{}'", other, upstream_id);
                None
            }
        }
    }

    pub fn report(&self) -> String {
        self.lock().spec.to_markdown()
    }

    /// Write the report, by default to `logs/execution_spec.md`
    pub fn save_report(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.logs_dir().join(REPORT_FILE));
        self.lock().spec.save(&path)?;
        info!("Saved execution report to {}", path.display());
        Ok(path)
    }

    /// Delete the workspace. With `keep_report` the report is first saved
    /// beside it as `<workspace>_execution_spec.md`, and that path returned.
    pub fn cleanup(&self, keep_report: bool) -> Result<Option<PathBuf>> {
        let kept = if keep_report {
            let name = self
                .workspace
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "workspace".to_string());
            let target = self
                .workspace
                .parent()
                .unwrap_or(&self.workspace)
                .join(format!("{}_{}", name, REPORT_FILE));
            Some(self.save_report(Some(&target))?)
        } else {
            None
        };

        if self.workspace.exists() {
            std::fs::remove_dir_all(&self.workspace)?;
            info!("Cleaned up workspace {}", self.workspace.display());
        }
        Ok(kept)
    }

    // ---- Shared run protocol ---------------------------------------------

    fn start_record(
        &self,
        skill_id: &str,
        kind: ExecutorKind,
        target: Option<String>,
        input: ExecutionInput,
    ) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(skill_id, kind, input);
        record.script_path = target;
        record.sandbox_used = self.backend.is_isolated();
        record.start();
        debug!(
            execution_id = %record.execution_id,
            skill_id,
            executor = %kind,
            "execution started"
        );
        record
    }

    fn finish(
        &self,
        mut record: ExecutionRecord,
        status: ExecutionStatus,
        output: ExecutionOutput,
        error: Option<String>,
    ) -> ExecutionOutput {
        record.finish(status, output.clone(), error);
        info!(
            execution_id = %record.execution_id,
            skill_id = %record.skill_id,
            status = %status,
            duration_ms = output.duration_ms,
            "execution finished"
        );
        self.lock().spec.add_record(record);
        output
    }

    fn fail(&self, record: ExecutionRecord, err: impl std::fmt::Display) -> ExecutionOutput {
        let message = err.to_string();
        error!("Execution of skill '{}' failed: {}", record.skill_id, message);
        self.finish(
            record,
            ExecutionStatus::Failed,
            ExecutionOutput::failure(message.clone()),
            Some(message),
        )
    }

    /// Matched-pattern reason, if `code` must not run
    fn screen(&self, code: &str) -> Option<String> {
        if !self.config.enable_security_check {
            return None;
        }
        security::check(code, !self.backend.is_isolated()).map(security::block_reason)
    }

    fn block(&self, record: ExecutionRecord, reason: String) -> ExecutionOutput {
        warn!("Blocked execution for skill '{}': {}", record.skill_id, reason);
        let output = ExecutionOutput::failure(format!("Security check failed: {}", reason));
        self.finish(record, ExecutionStatus::SecurityBlocked, output, Some(reason))
    }

    fn stage_inputs(&self, files: &BTreeMap<String, PathBuf>) -> Result<()> {
        let inputs = self.inputs_dir();
        for (name, source) in files {
            let file_name = Path::new(name)
                .file_name()
                .ok_or_else(|| ExecutorError::InvalidScript {
                    path: source.clone(),
                    reason: format!("invalid input file name '{}'", name),
                })?;
            std::fs::copy(source, inputs.join(file_name))?;
        }
        Ok(())
    }

    /// Host path as visible to executed code
    fn visible_path(&self, view: &WorkspaceView, path: &Path) -> String {
        let mounted = self
            .lock()
            .skill_dirs
            .iter()
            .find(|(_, host)| host.as_path() == path)
            .map(|(id, host)| (id.clone(), host.clone()));
        match mounted {
            Some((id, host)) => self.backend.skill_mount_path(&id, &host),
            None => view.translate(&self.workspace, path),
        }
    }

    fn context(&self, record: &ExecutionRecord) -> Result<RunContext> {
        self.stage_inputs(&record.input.input_files)?;

        let view = self.backend.view(&self.workspace);
        let mounted = self.lock().skill_dirs.get(&record.skill_id).cloned();
        let skill_dir = match (&record.input.working_dir, mounted) {
            (Some(dir), _) => Some(self.visible_path(&view, dir)),
            (None, Some(host)) => Some(self.backend.skill_mount_path(&record.skill_id, &host)),
            (None, None) => None,
        };

        let mut env = view.base_env();
        if let Some(dir) = &skill_dir {
            env.insert("SKILL_DIR".to_string(), dir.clone());
        }
        env.extend(record.input.env_vars.clone());

        Ok(RunContext {
            cwd: skill_dir.clone().unwrap_or_else(|| view.root.clone()),
            view,
            skill_dir,
            env,
        })
    }

    fn mounts(&self) -> Vec<Mount> {
        let mut mounts = vec![Mount {
            host: self.workspace.clone(),
            target: SANDBOX_ROOT.to_string(),
            read_only: false,
        }];
        for (id, host) in &self.lock().skill_dirs {
            mounts.push(Mount {
                host: host.clone(),
                target: self.backend.skill_mount_path(id, host),
                read_only: true,
            });
        }
        mounts
    }

    fn launch(&self, program: &str, ctx: &RunContext, input: &ExecutionInput) -> Launch {
        let mut launch = Launch::new(program, self.config.timeout());
        launch.env = ctx.env.clone();
        launch.cwd = Some(ctx.cwd.clone());
        launch.stdin = input.stdin.clone();
        launch.mounts = self.mounts();
        launch
    }

    /// Persist generated code under `scripts/`
    fn write_script(&self, ext: &str, body: &str) -> Result<PathBuf> {
        let path = self.scripts_dir().join(format!("_temp_{}.{}", short_id(), ext));
        std::fs::write(&path, body)?;
        Ok(path)
    }

    async fn read_script(path: &Path, allowed: &[&str]) -> Result<String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !allowed.contains(&ext.as_str()) {
            return Err(ExecutorError::InvalidScript {
                path: path.to_path_buf(),
                reason: format!("extension not in {:?}", allowed),
            });
        }
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn dispatch(&self, record: ExecutionRecord, launch: Launch) -> ExecutionOutput {
        let output_dir = self.output_dir();
        let before = snapshot(&output_dir);
        let timeout = launch.timeout;

        let started = Instant::now();
        let result = if self.backend.is_isolated() {
            let _gate = self.sandbox_gate.lock().await;
            self.backend.run(launch).await
        } else {
            self.backend.run(launch).await
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let output_files = collect_outputs(&output_dir, &before);

        match result {
            Ok(raw) if raw.timed_out => {
                let message = format!("Execution timed out after {}s", timeout.as_secs_f64());
                let output = ExecutionOutput {
                    stdout: raw.stdout,
                    stderr: message.clone(),
                    exit_code: -1,
                    output_files,
                    duration_ms,
                    ..ExecutionOutput::default()
                };
                self.finish(record, ExecutionStatus::Timeout, output, Some(message))
            }
            Ok(raw) => {
                let status = if raw.exit_code == 0 {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failed
                };
                let output = ExecutionOutput {
                    stdout: raw.stdout,
                    stderr: raw.stderr,
                    exit_code: raw.exit_code,
                    output_files,
                    duration_ms,
                    ..ExecutionOutput::default()
                };
                self.finish(record, status, output, None)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Dispatch for skill '{}' failed: {}", record.skill_id, message);
                let output = ExecutionOutput {
                    duration_ms,
                    output_files,
                    ..ExecutionOutput::failure(message.clone())
                };
                self.finish(record, ExecutionStatus::Failed, output, Some(message))
            }
        }
    }

    // ---- Python ------------------------------------------------------------

    fn prepare_python(&self, record: &ExecutionRecord, code: &str) -> Result<Launch> {
        let ctx = self.context(record)?;
        let preamble = python_preamble(
            &ctx.view,
            ctx.skill_dir.as_deref(),
            &record.input.env_vars,
            &record.input.args,
        );
        let file = self.write_script("py", &format!("{}\n{}", preamble, code))?;

        let mut launch = self
            .launch(self.backend.python(), &ctx, &record.input)
            .arg(ctx.view.translate(&self.workspace, &file));
        launch.requirements = record.input.requirements.clone();
        Ok(launch)
    }

    async fn run_python(&self, record: ExecutionRecord, code: &str) -> ExecutionOutput {
        if let Some(reason) = self.screen(code) {
            return self.block(record, reason);
        }
        match self.prepare_python(&record, code) {
            Ok(launch) => self.dispatch(record, launch).await,
            Err(e) => self.fail(record, e),
        }
    }

    /// Run a Python script file
    pub async fn run_python_script(
        &self,
        skill_id: &str,
        path: impl AsRef<Path>,
        input: ExecutionInput,
    ) -> ExecutionOutput {
        let path = path.as_ref();
        let record = self.start_record(
            skill_id,
            ExecutorKind::PythonScript,
            Some(path.display().to_string()),
            input,
        );
        match Self::read_script(path, &["py"]).await {
            Ok(code) => self.run_python(record, &code).await,
            Err(e) => self.fail(record, e),
        }
    }

    /// Run inline Python code
    pub async fn run_inline_code(
        &self,
        skill_id: &str,
        code: &str,
        input: ExecutionInput,
    ) -> ExecutionOutput {
        let record = self.start_record(
            skill_id,
            ExecutorKind::PythonCode,
            Some("<inline>".to_string()),
            input,
        );
        self.run_python(record, code).await
    }

    /// Run any allowed script file, choosing the executor by extension
    pub async fn run_script(
        &self,
        skill_id: &str,
        path: impl AsRef<Path>,
        input: ExecutionInput,
    ) -> ExecutionOutput {
        let path = path.as_ref();
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ExecutorKind::from_extension);
        match kind {
            Some(ExecutorKind::Shell) => self.run_shell_script(skill_id, path, input).await,
            Some(ExecutorKind::JavaScript) => {
                self.run_javascript(skill_id, JsSource::Path(path.to_path_buf()), None, input)
                    .await
            }
            _ => self.run_python_script(skill_id, path, input).await,
        }
    }

    // ---- In-process function -------------------------------------------------

    /// Call `func` in this process. Never sandboxed; the real return value
    /// is kept. `_output_dir` is added to the keyword arguments.
    pub fn run_function<F>(
        &self,
        skill_id: &str,
        name: &str,
        func: F,
        input: ExecutionInput,
    ) -> ExecutionOutput
    where
        F: FnOnce(&[String], &Map<String, Value>) -> std::result::Result<Value, String>,
    {
        let mut record = ExecutionRecord::new(skill_id, ExecutorKind::Function, input);
        record.function_name = Some(name.to_string());
        record.sandbox_used = false;
        record.start();

        let mut kwargs = record.input.kwargs.clone();
        kwargs.insert(
            "_output_dir".to_string(),
            Value::from(self.output_dir().display().to_string()),
        );

        let output_dir = self.output_dir();
        let before = snapshot(&output_dir);
        let started = Instant::now();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| func(record.input.args.as_slice(), &kwargs)));
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let message = match result {
            Ok(Ok(value)) => {
                let output = ExecutionOutput {
                    return_value: Some(value),
                    exit_code: 0,
                    output_files: collect_outputs(&output_dir, &before),
                    duration_ms,
                    ..ExecutionOutput::default()
                };
                return self.finish(record, ExecutionStatus::Success, output, None);
            }
            Ok(Err(message)) => message,
            Err(payload) => panic_message(payload),
        };

        error!("Function '{}' of skill '{}' failed: {}", name, skill_id, message);
        let output = ExecutionOutput {
            duration_ms,
            ..ExecutionOutput::failure(message.clone())
        };
        self.finish(record, ExecutionStatus::Failed, output, Some(message))
    }

    // ---- Shell -------------------------------------------------------------

    /// Run a shell command line
    pub async fn run_shell(
        &self,
        skill_id: &str,
        command: &str,
        input: ExecutionInput,
    ) -> ExecutionOutput {
        let record = self.start_record(
            skill_id,
            ExecutorKind::Shell,
            Some(clip_label(command, COMMAND_LABEL_CHARS)),
            input,
        );
        if let Some(reason) = self.screen(command) {
            return self.block(record, reason);
        }

        let ctx = match self.context(&record) {
            Ok(ctx) => ctx,
            Err(e) => return self.fail(record, e),
        };
        let (shell, flag) = self.backend.shell();
        let launch = self
            .launch(shell, &ctx, &record.input)
            .args([flag.to_string(), shell_with_exports(&ctx.env, &record.input.args, command)]);
        self.dispatch(record, launch).await
    }

    async fn run_shell_script(
        &self,
        skill_id: &str,
        path: &Path,
        input: ExecutionInput,
    ) -> ExecutionOutput {
        let record = self.start_record(
            skill_id,
            ExecutorKind::Shell,
            Some(path.display().to_string()),
            input,
        );
        let body = match Self::read_script(path, &["sh", "bash"]).await {
            Ok(body) => body,
            Err(e) => return self.fail(record, e),
        };
        if let Some(reason) = self.screen(&body) {
            return self.block(record, reason);
        }

        let prepared = self.context(&record).and_then(|ctx| {
            let ext = if path.extension().is_some_and(|e| e == "bash") {
                "bash"
            } else {
                "sh"
            };
            let file = self.write_script(ext, &body)?;
            Ok(self
                .launch(ext, &ctx, &record.input)
                .arg(ctx.view.translate(&self.workspace, &file))
                .args(record.input.args.clone()))
        });
        match prepared {
            Ok(launch) => self.dispatch(record, launch).await,
            Err(e) => self.fail(record, e),
        }
    }

    // ---- JavaScript ----------------------------------------------------------

    /// Run JavaScript through `runtime` (the backend's node by default)
    pub async fn run_javascript(
        &self,
        skill_id: &str,
        source: JsSource,
        runtime: Option<&str>,
        input: ExecutionInput,
    ) -> ExecutionOutput {
        let target = match &source {
            JsSource::Path(path) => path.display().to_string(),
            JsSource::Code(_) => "<inline>".to_string(),
        };
        let record = self.start_record(skill_id, ExecutorKind::JavaScript, Some(target), input);

        let (code, ext) = match source {
            JsSource::Path(path) => match Self::read_script(&path, &["js", "mjs"]).await {
                Ok(code) => {
                    let ext = if path.extension().is_some_and(|e| e == "mjs") {
                        "mjs"
                    } else {
                        "js"
                    };
                    (code, ext)
                }
                Err(e) => return self.fail(record, e),
            },
            JsSource::Code(code) => (code, "js"),
        };
        if let Some(reason) = self.screen(&code) {
            return self.block(record, reason);
        }

        let runtime = runtime.unwrap_or(self.backend.node());
        let prepared = self.context(&record).and_then(|ctx| {
            let body = format!("{}\n{}", js_preamble(&ctx.view, &record.input.env_vars), code);
            let file = self.write_script(ext, &body)?;
            Ok(self
                .launch(runtime, &ctx, &record.input)
                .arg(ctx.view.translate(&self.workspace, &file))
                .args(record.input.args.clone()))
        });
        match prepared {
            Ok(launch) => self.dispatch(record, launch).await,
            Err(e) => self.fail(record, e),
        }
    }

    // ---- Unified entry point -----------------------------------------------

    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutput {
        match request {
            ExecutionRequest::PythonScript {
                skill_id,
                path,
                input,
            } => self.run_python_script(&skill_id, &path, input).await,
            ExecutionRequest::PythonCode {
                skill_id,
                code,
                input,
            } => self.run_inline_code(&skill_id, &code, input).await,
            ExecutionRequest::Function {
                skill_id,
                name,
                func,
                input,
            } => self.run_function(&skill_id, &name, |args, kwargs| func(args, kwargs), input),
            ExecutionRequest::Shell {
                skill_id,
                command,
                input,
            } => self.run_shell(&skill_id, &command, input).await,
            ExecutionRequest::JavaScript {
                skill_id,
                source,
                runtime,
                input,
            } => {
                self.run_javascript(&skill_id, source, runtime.as_deref(), input)
                    .await
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn container(dir: &Path) -> SkillContainer {
        SkillContainer::new(ContainerConfig::local().with_workspace(dir.join("ws"))).unwrap()
    }

    #[test]
    fn test_workspace_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());

        for sub in ["outputs", "scripts", "logs", "inputs"] {
            assert!(c.workspace().join(sub).is_dir(), "missing {sub}");
        }
        assert_eq!(c.backend_name(), "local");
        assert!(!c.is_sandboxed());
    }

    #[test]
    fn test_default_config_uses_sandbox() {
        let config = ContainerConfig::default();
        assert!(config.use_sandbox);
        assert!(config.enable_security_check);
        assert_eq!(config.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_function_keeps_return_value() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());
        let input = ExecutionInput::new().with_args(["3", "4"]).with_kwarg("scale", 10);

        let output = c.run_function(
            "math",
            "multiply",
            |args, kwargs| {
                let a: i64 = args[0].parse().map_err(|e| format!("{e}"))?;
                let b: i64 = args[1].parse().map_err(|e| format!("{e}"))?;
                assert!(kwargs.contains_key("_output_dir"));
                let scale = kwargs["scale"].as_i64().unwrap_or(1);
                Ok(Value::from(a * b * scale))
            },
            input,
        );

        assert_eq!(output.return_value, Some(Value::from(120)));
        let records = c.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Success);
        assert_eq!(records[0].function_name.as_deref(), Some("multiply"));
        assert!(!records[0].sandbox_used);
        assert!(!records[0].input.kwargs.contains_key("_output_dir"));
    }

    #[test]
    fn test_function_error_and_panic_are_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());

        let failed = c.run_function("s", "bad", |_, _| Err("boom".into()), ExecutionInput::new());
        assert_eq!(failed.exit_code, -1);
        assert_eq!(failed.stderr, "boom");

        let panicked = c.run_function("s", "worse", |_, _| panic!("kaboom"), ExecutionInput::new());
        assert_eq!(panicked.stderr, "kaboom");

        let records = c.records();
        assert!(records.iter().all(|r| r.status == ExecutionStatus::Failed));
        assert_eq!(records[1].error_message.as_deref(), Some("kaboom"));
    }

    #[test]
    fn test_function_output_files() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());
        std::fs::write(c.output_dir().join("old.txt"), "old").unwrap();

        let output = c.run_function(
            "writer",
            "write",
            |_, kwargs| {
                let dir = kwargs["_output_dir"].as_str().unwrap_or_default();
                std::fs::write(Path::new(dir).join("new.txt"), "new").map_err(|e| e.to_string())?;
                Ok(Value::Null)
            },
            ExecutionInput::new(),
        );

        assert_eq!(output.output_files.keys().collect::<Vec<_>>(), vec!["new.txt"]);
    }

    #[test]
    fn test_link_skills_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());
        assert!(c.link_skills("pdf", None).is_none());

        c.link_upstream(
            "pdf",
            ExecutionOutput {
                stdout: "3 tables".into(),
                exit_code: 0,
                ..ExecutionOutput::default()
            },
        );
        assert_eq!(c.link_skills("pdf", None), Some(Value::from("3 tables")));
        assert_eq!(c.link_skills("pdf", Some("exit_code")), Some(Value::from(0)));
        assert_eq!(c.link_skills("pdf", Some("return_value")), Some(Value::Null));
        assert_eq!(
            c.link_skills("pdf", Some("output")).unwrap()["stdout"],
            "3 tables"
        );
        assert!(c.link_skills("pdf", Some("nope")).is_none());

        c.link_upstream(
            "calc",
            ExecutionOutput {
                return_value: Some(Value::from(42)),
                stdout: "ignored".into(),
                ..ExecutionOutput::default()
            },
        );
        assert_eq!(c.link_skills("calc", None), Some(Value::from(42)));
    }

    #[test]
    fn test_mount_and_sandbox_path() {
        let tmp = tempfile::tempdir().unwrap();
        let skill_dir = tmp.path().join("pdf-skill");
        std::fs::create_dir_all(&skill_dir).unwrap();

        let local = container(tmp.path());
        local.mount_skill_directory("pdf@1.0", &skill_dir).unwrap();
        assert_eq!(
            local.skill_sandbox_path("pdf@1.0"),
            Some(skill_dir.canonicalize().unwrap().display().to_string())
        );
        assert!(local.skill_sandbox_path("other").is_none());

        let docker = container(tmp.path()).with_backend(Arc::new(DockerBackend::default()));
        docker.mount_skill_directory("pdf@1.0", &skill_dir).unwrap();
        assert_eq!(
            docker.skill_sandbox_path("pdf@1.0").as_deref(),
            Some("/sandbox/skills/pdf_1.0")
        );
    }

    #[tokio::test]
    async fn test_rejected_extension_is_failed_record() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());
        let script = tmp.path().join("tool.rb");
        std::fs::write(&script, "puts 1").unwrap();

        let output = c.run_python_script("ruby", &script, ExecutionInput::new()).await;

        assert_eq!(output.exit_code, -1);
        let record = &c.records()[0];
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.as_deref().unwrap().contains("extension"));
    }

    #[tokio::test]
    async fn test_missing_script_is_failed_record() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());

        let output = c
            .run_script("ghost", tmp.path().join("missing.py"), ExecutionInput::new())
            .await;

        assert_eq!(output.exit_code, -1);
        assert_eq!(c.records()[0].status, ExecutionStatus::Failed);
        assert!(c.records()[0].error_message.as_deref().unwrap().starts_with("IO error"));
    }

    #[test]
    fn test_save_report_and_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container(tmp.path());
        c.run_function("s", "noop", |_, _| Ok(Value::Null), ExecutionInput::new());

        let default_path = c.save_report(None).unwrap();
        assert_eq!(default_path, c.logs_dir().join("execution_spec.md"));
        assert!(std::fs::read_to_string(&default_path)
            .unwrap()
            .contains("- **Successful**: 1"));

        let kept = c.cleanup(true).unwrap().unwrap();
        assert!(!c.workspace().exists());
        assert!(kept.exists());
        assert!(kept.file_name().unwrap().to_string_lossy().ends_with("_execution_spec.md"));
    }
}
