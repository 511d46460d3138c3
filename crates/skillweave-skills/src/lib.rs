//! Skillweave Skills - skill catalog loader
//!
//! Discovers skill packages on disk and turns them into the
//! [`SkillCatalog`](skillweave_types::SkillCatalog) consumed by the planner.
//!
//! ## Features
//!
//! - Progressive disclosure: metadata at discovery, full SKILL.md on demand
//! - YAML frontmatter (`name`, `description`, optional `version`, `author`, `tags`)
//! - Bundled files classified into scripts, references and resources
//! - Multiple skills directories (personal, project, configured)
//!
//! ## Layout
//!
//! ```text
//! skills/
//!   pdf/
//!     SKILL.md          <- frontmatter + instructions
//!     scripts/extract.py
//!     references/forms.md
//!     assets/template.xlsx
//! ```

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod registry;
pub mod skill;

pub use registry::SkillsRegistry;
pub use skill::{load_skill_dir, SkillMetadata};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{load_skill_dir, SkillsRegistry};
}
