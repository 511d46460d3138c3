//! Skillweave Planner - from a free-text task to an ordered skill DAG
//!
//! ## Features
//!
//! - Direct selection: one model call over the whole catalog
//! - Search mode: analyze → retrieve → evaluate → re-retrieve reflection loop
//!   over the hybrid retriever, bounded by `max_iterations`
//! - Fast (descriptions) and deep (SKILL.md bodies) relevance filters ahead
//!   of DAG construction
//! - Best-effort decoding of model JSON with neutral defaults
//! - DAG sanitizing and topological repair of inconsistent orders
//!
//! `dag[a]` always lists the skills `a` depends on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dag;
pub mod error;
pub mod planner;
pub mod prompts;
pub mod response;

pub use error::{PlannerError, Result};
pub use planner::{AutoSkillsPlanner, PlannerConfig, PlannerMode};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{AutoSkillsPlanner, PlannerConfig, PlannerError, PlannerMode};
}
