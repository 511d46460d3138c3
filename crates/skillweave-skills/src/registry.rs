//! Skills registry for managing multiple skill roots
//!
//! Implements progressive disclosure:
//! - Phase 1: Scan directories and load metadata only
//! - Phase 2: Load full SKILL.md content on demand

use anyhow::{Context, Result};
use skillweave_types::{SkillCatalog, SkillRecord};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::skill::load_skill_dir;

/// Registry of discovered skills, keyed by skill id
pub struct SkillsRegistry {
    skills: BTreeMap<String, SkillRecord>,
    directories: Vec<PathBuf>,
}

/// Expand a leading `~` to the home directory
pub fn expand_home(dir: &str) -> PathBuf {
    match (dir.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(dir),
    }
}

impl SkillsRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            skills: BTreeMap::new(),
            directories: Vec::new(),
        }
    }

    /// Add a skills root to scan
    pub fn add_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directories.push(dir.into());
        self
    }

    /// Add personal skills directory: ~/.skillweave/skills/
    pub fn with_personal_skills(self) -> Self {
        if let Some(home) = dirs::home_dir() {
            self.add_directory(home.join(".skillweave").join("skills"))
        } else {
            warn!("Could not find home directory for personal skills");
            self
        }
    }

    /// Add project skills directory: ./.skillweave/skills/
    pub fn with_project_skills(self) -> Self {
        self.add_directory(PathBuf::from(".skillweave/skills"))
    }

    /// Scan all configured roots (Phase 1: Discovery)
    pub fn discover(&mut self) -> Result<()> {
        info!(
            "Starting skills discovery in {} directories",
            self.directories.len()
        );

        let directories = self.directories.clone();

        for dir in &directories {
            if !dir.exists() {
                debug!("Skills directory does not exist: {:?}", dir);
                continue;
            }

            if !dir.is_dir() {
                warn!("Skills path is not a directory: {:?}", dir);
                continue;
            }

            if dir.join("SKILL.md").exists() {
                self.register_dir(dir);
            } else {
                self.scan_directory(dir)?;
            }
        }

        info!("Discovered {} skills", self.skills.len());
        Ok(())
    }

    fn scan_directory(&mut self, dir: &Path) -> Result<()> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        paths.sort();

        for path in paths {
            self.register_dir(&path);
        }
        Ok(())
    }

    fn register_dir(&mut self, path: &Path) {
        match load_skill_dir(path, false) {
            Ok(skill) => {
                if let Some(existing) = self.skills.get(&skill.id) {
                    warn!(
                        "Duplicate skill id '{}' at {:?}, keeping {:?}",
                        skill.id, path, existing.path
                    );
                    return;
                }
                debug!("Discovered skill: {} at {:?}", skill.id, path);
                self.skills.insert(skill.id.clone(), skill);
            }
            Err(e) => {
                debug!("Skipping {:?}: {:#}", path, e);
            }
        }
    }

    /// Insert an already-built record, replacing any with the same id
    pub fn insert(&mut self, record: SkillRecord) {
        self.skills.insert(record.id.clone(), record);
    }

    /// Get a skill by id
    pub fn get(&self, id: &str) -> Option<&SkillRecord> {
        self.skills.get(id)
    }

    /// Load full SKILL.md content for a skill (Phase 2: Activation)
    pub fn load_skill(&mut self, id: &str) -> Result<&SkillRecord> {
        let skill = self
            .skills
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Skill '{}' not found", id))?;

        if skill.content.is_none() {
            if let Some(path) = &skill.path {
                let file = path.join("SKILL.md");
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {:?}", file))?;
                skill.content = Some(content);
            }
        }
        Ok(skill)
    }

    /// Load content for every skill
    pub fn load_all(&mut self) -> Result<()> {
        let ids: Vec<String> = self.skills.keys().cloned().collect();
        for id in ids {
            self.load_skill(&id)?;
        }
        Ok(())
    }

    /// Get all skill ids
    pub fn skill_ids(&self) -> impl Iterator<Item = &String> {
        self.skills.keys()
    }

    /// Get number of skills
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Snapshot of the registry as a planner catalog
    pub fn catalog(&self) -> SkillCatalog {
        self.skills.clone()
    }

    /// Sorted "- name: description" listing
    pub fn render_catalog_prompt(&self) -> String {
        if self.skills.is_empty() {
            return String::new();
        }

        let mut sorted: Vec<_> = self.skills.values().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut prompt = String::from("Available skills:\n");
        for skill in sorted {
            prompt.push_str(&skill.to_summary());
            prompt.push('\n');
        }
        prompt
    }
}

impl Default for SkillsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
