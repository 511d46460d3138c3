use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Skill id → record. Ordered so corpus construction is deterministic.
pub type SkillCatalog = BTreeMap<String, SkillRecord>;

/// Role of a file bundled with a skill
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SkillFileKind {
    Script,
    Reference,
    Resource,
}

/// A file shipped inside a skill directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillFile {
    /// File name relative to the skill directory
    pub name: String,
    pub kind: SkillFileKind,
    /// Absolute (or catalog-relative) path on disk
    pub path: PathBuf,
    #[serde(default)]
    pub required: bool,
}

impl SkillFile {
    pub fn new(name: impl Into<String>, kind: SkillFileKind, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            required: false,
        }
    }

    /// Lower-cased extension without the dot, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Parsed metadata of one skill package.
///
/// Records are immutable once the catalog is built; the planner and the
/// retriever only ever read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Full SKILL.md body, loaded on demand
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub scripts: Vec<SkillFile>,
    #[serde(default)]
    pub references: Vec<SkillFile>,
    #[serde(default)]
    pub resources: Vec<SkillFile>,
    /// Skill directory on disk
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_version() -> String {
    "latest".to_string()
}

impl SkillRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            version: default_version(),
            author: None,
            tags: Vec::new(),
            content: None,
            scripts: Vec::new(),
            references: Vec::new(),
            resources: Vec::new(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_script(mut self, file: SkillFile) -> Self {
        self.scripts.push(file);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Retrieval document: `"[id] name: description"`
    pub fn corpus_document(&self) -> String {
        format!("[{}] {}: {}", self.id, self.name, self.description)
    }

    /// First script, in declaration order, whose extension is in `extensions`
    pub fn first_script_with(&self, extensions: &[&str]) -> Option<&SkillFile> {
        self.scripts.iter().find(|f| {
            f.extension()
                .is_some_and(|ext| extensions.contains(&ext.as_str()))
        })
    }

    /// Concise one-line listing: `"- name: description"`
    pub fn to_summary(&self) -> String {
        format!("- {}: {}", self.name, self.description)
    }
}
