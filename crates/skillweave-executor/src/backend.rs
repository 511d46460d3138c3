//! Process backends: direct host execution and Docker isolation

use crate::error::{ExecutorError, Result};
use crate::preamble::{shell_quote, WorkspaceView, SANDBOX_ROOT};
use crate::types::short_id;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Host directory bind-mounted into a sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// One process launch, with paths already expressed in the backend's view
#[derive(Debug, Clone)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<String>,
    pub stdin: Option<String>,
    pub timeout: Duration,
    /// Python packages to install first
    pub requirements: Vec<String>,
    /// Ignored by backends that run on the host
    pub mounts: Vec<Mount>,
}

impl Launch {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            stdin: None,
            timeout,
            requirements: Vec::new(),
            mounts: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whole invocation as one shell-quoted string
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a process produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl RawOutput {
    /// Output of a process killed at its deadline
    pub fn timeout() -> Self {
        Self {
            exit_code: -1,
            timed_out: true,
            ..Self::default()
        }
    }
}

/// Where and how skill processes run
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether processes are isolated from the host
    fn is_isolated(&self) -> bool;

    /// Workspace paths as seen by executed code
    fn view(&self, workspace: &Path) -> WorkspaceView;

    /// Path at which a mounted skill directory is visible
    fn skill_mount_path(&self, skill_id: &str, host: &Path) -> String;

    fn python(&self) -> &'static str {
        "python3"
    }

    fn node(&self) -> &'static str {
        "node"
    }

    /// Program and flag used to run a shell command string
    fn shell(&self) -> (&'static str, &'static str) {
        ("sh", "-c")
    }

    async fn run(&self, launch: Launch) -> Result<RawOutput>;
}

/// Spawn `cmd`, feed stdin, and wait at most `timeout`.
///
/// Feeding stdin and collecting output share the deadline, so a child that
/// never reads its stdin still times out. On timeout the child is dropped,
/// which kills it (`kill_on_drop`).
async fn run_process(
    mut cmd: Command,
    program: &str,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<RawOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ExecutorError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            // A child that exits without reading closes the pipe early
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                debug!("stdin not fully written to {}: {}", program, e);
            }
        }
    };
    let finished = async move {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    match tokio::time::timeout(timeout, finished).await {
        Ok(Ok(output)) => Ok(RawOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            warn!(program, timeout_secs = timeout.as_secs_f64(), "process timed out");
            Ok(RawOutput::timeout())
        }
    }
}

/// Run an optional `setup` command, then `cmd`, under one `timeout` budget.
///
/// A failed setup is an [`ExecutorError::Requirements`]; a setup that uses up
/// the whole budget yields a timed out output without starting `cmd`.
async fn run_staged(
    setup: Option<(Command, &str)>,
    cmd: Command,
    program: &str,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<RawOutput> {
    let deadline = Instant::now() + timeout;

    if let Some((setup, setup_program)) = setup {
        let out = run_process(setup, setup_program, None, timeout).await?;
        if out.timed_out {
            return Ok(out);
        }
        if out.exit_code != 0 {
            return Err(ExecutorError::Requirements(out.stderr.trim().to_string()));
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        warn!(program, "no time left after setup");
        return Ok(RawOutput::timeout());
    }
    run_process(cmd, program, stdin, remaining).await
}

/// Runs processes directly on the host
#[derive(Debug, Clone, Default)]
pub struct LocalBackend;

impl LocalBackend {
    /// `pip install` for `requirements`
    fn install_command(&self, requirements: &[String]) -> Command {
        debug!(?requirements, "installing requirements");
        let mut cmd = Command::new(self.python());
        cmd.args(["-m", "pip", "install", "--quiet", "--disable-pip-version-check"])
            .args(requirements);
        cmd
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_isolated(&self) -> bool {
        false
    }

    fn view(&self, workspace: &Path) -> WorkspaceView {
        WorkspaceView::host(workspace)
    }

    fn skill_mount_path(&self, _skill_id: &str, host: &Path) -> String {
        host.display().to_string()
    }

    fn python(&self) -> &'static str {
        if cfg!(windows) {
            "python"
        } else {
            "python3"
        }
    }

    fn shell(&self) -> (&'static str, &'static str) {
        if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        }
    }

    async fn run(&self, launch: Launch) -> Result<RawOutput> {
        let setup = (!launch.requirements.is_empty())
            .then(|| (self.install_command(&launch.requirements), self.python()));

        let mut cmd = Command::new(&launch.program);
        cmd.args(&launch.args).envs(&launch.env);
        if let Some(cwd) = &launch.cwd {
            cmd.current_dir(cwd);
        }

        debug!(program = %launch.program, cwd = ?launch.cwd, "running locally");
        run_staged(
            setup,
            cmd,
            &launch.program,
            launch.stdin.as_deref(),
            launch.timeout,
        )
        .await
    }
}

/// Docker sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerConfig {
    pub image: String,
    pub memory_limit: String,
    pub network_enabled: bool,
    /// Docker CLI binary
    pub docker_bin: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image: "python:3.11-slim".to_string(),
            memory_limit: "512m".to_string(),
            network_enabled: false,
            docker_bin: "docker".to_string(),
        }
    }
}

/// Runs each launch in a throwaway container
#[derive(Debug, Clone, Default)]
pub struct DockerBackend {
    config: DockerConfig,
}

/// Mount-safe form of a skill id
pub fn safe_skill_id(skill_id: &str) -> String {
    skill_id.replace(['@', '/'], "_")
}

impl DockerBackend {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    /// `docker run` arguments for `launch` in a container called `name`
    pub fn docker_args(&self, name: &str, launch: &Launch) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "-i".into(),
            "--name".into(),
            name.into(),
            "--network".into(),
            if self.config.network_enabled {
                "bridge".into()
            } else {
                "none".into()
            },
            "--memory".into(),
            self.config.memory_limit.clone(),
        ];

        for mount in &launch.mounts {
            args.push("-v".into());
            args.push(format!(
                "{}:{}:{}",
                mount.host.display(),
                mount.target,
                if mount.read_only { "ro" } else { "rw" }
            ));
        }

        args.push("-w".into());
        args.push(launch.cwd.clone().unwrap_or_else(|| SANDBOX_ROOT.to_string()));

        for (key, value) in &launch.env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }

        let mut script = launch.command_line();
        if !launch.requirements.is_empty() {
            let packages = launch
                .requirements
                .iter()
                .map(|r| shell_quote(r))
                .collect::<Vec<_>>()
                .join(" ");
            script = format!(
                "pip install --quiet --disable-pip-version-check {} && {}",
                packages, script
            );
        }

        args.extend([self.config.image.clone(), "sh".into(), "-c".into(), script]);
        args
    }

    async fn kill(&self, name: &str) {
        let result = Command::new(&self.config.docker_bin)
            .args(["kill", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            warn!("Failed to kill container {}: {}", name, e);
        }
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn is_isolated(&self) -> bool {
        true
    }

    fn view(&self, _workspace: &Path) -> WorkspaceView {
        WorkspaceView::sandbox()
    }

    fn skill_mount_path(&self, skill_id: &str, _host: &Path) -> String {
        format!("{}/skills/{}", SANDBOX_ROOT, safe_skill_id(skill_id))
    }

    fn python(&self) -> &'static str {
        "python"
    }

    async fn run(&self, launch: Launch) -> Result<RawOutput> {
        let name = format!("skillweave-{}", short_id());
        let mut cmd = Command::new(&self.config.docker_bin);
        cmd.args(self.docker_args(&name, &launch));

        debug!(container = %name, image = %self.config.image, "running in sandbox");
        let out = run_process(
            cmd,
            &self.config.docker_bin,
            launch.stdin.as_deref(),
            launch.timeout,
        )
        .await?;

        if out.timed_out {
            // The CLI was killed; the container itself is still running
            self.kill(&name).await;
        }
        Ok(out)
    }
}
