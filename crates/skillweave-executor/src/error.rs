//! Error types for the execution engine
//!
//! These surface only from setup and plumbing. A script that fails, times
//! out or is blocked is reported through its `ExecutionRecord`, not here.

use std::path::PathBuf;
use thiserror::Error;

/// Executor errors
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Filesystem operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Process could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was launched
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Isolation backend misbehaved
    #[error("Sandbox backend error: {0}")]
    Backend(String),

    /// Package installation before a run failed
    #[error("Failed to install requirements: {0}")]
    Requirements(String),

    /// Script path rejected before execution
    #[error("Invalid script {path:?}: {reason}")]
    InvalidScript {
        /// Offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Skill id not present in the catalog
    #[error("Unknown skill '{0}'")]
    UnknownSkill(String),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, ExecutorError>;
