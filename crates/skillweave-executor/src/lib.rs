//! Skillweave Executor - screened execution of skill artifacts
//!
//! ## Features
//!
//! - Python scripts and inline code, shell commands, JavaScript, and
//!   in-process functions behind one [`SkillContainer`]
//! - Static security screen before anything is spawned
//! - Local subprocess or Docker sandbox backends, same environment contract
//! - Markdown execution report of every call
//! - [`SkillDagRunner`] for running a planned DAG with upstream outputs wired in
//! - [`GuidedExecutor`]: model-written commands with bounded error repair
//!
//! ## Example
//!
//! ```no_run
//! use skillweave_executor::{ContainerConfig, ExecutionInput, SkillContainer};
//!
//! # async fn demo() -> skillweave_executor::Result<()> {
//! let container = SkillContainer::new(ContainerConfig::local())?;
//! let output = container
//!     .run_shell("hello", "echo hi", ExecutionInput::new())
//!     .await;
//! assert_eq!(output.stdout.trim(), "hi");
//! container.save_report(None)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod backend;
pub mod container;
pub mod error;
pub mod guided;
pub mod preamble;
pub mod report;
pub mod runner;
pub mod security;
pub mod types;

pub use backend::{DockerBackend, DockerConfig, ExecutionBackend, LocalBackend};
pub use container::{ContainerConfig, ExecutionRequest, JsSource, SkillContainer, SkillFunction};
pub use error::{ExecutorError, Result};
pub use guided::{GuidedCommand, GuidedExecutor};
pub use report::ExecutionSpec;
pub use runner::{ArtifactResolver, DagRunReport, DefaultResolver, SkillArtifact, SkillDagRunner, SkillRunResult};
pub use types::{ExecutionInput, ExecutionOutput, ExecutionRecord, ExecutionStatus, ExecutorKind};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ContainerConfig, ExecutionInput, ExecutionOutput, ExecutionStatus, SkillContainer,
        SkillDagRunner,
    };
}
