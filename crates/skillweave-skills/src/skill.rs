//! Skill directory parsing
//!
//! Each skill is a folder containing SKILL.md with YAML frontmatter

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use skillweave_types::{SkillFile, SkillFileKind, SkillRecord};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Maximum allowed name length
const MAX_NAME_LENGTH: usize = 64;
/// Maximum allowed description length
const MAX_DESCRIPTION_LENGTH: usize = 1024;

/// Extensions treated as executable scripts
pub const SCRIPT_EXTENSIONS: &[&str] = &["py", "sh", "bash", "js", "mjs"];
/// Extensions treated as reference documents
const REFERENCE_EXTENSIONS: &[&str] = &["md", "txt", "pdf"];

const IGNORED_NAMES: &[&str] = &["__pycache__", ".git", ".DS_Store", ".pytest_cache", "node_modules"];
const IGNORED_EXTENSIONS: &[&str] = &["pyc", "pyo"];

/// Skill metadata extracted from YAML frontmatter
#[derive(Debug, Clone, Deserialize)]
pub struct SkillMetadata {
    /// Skill name (max 64 chars, lowercase letters/numbers/hyphens only)
    pub name: String,
    /// What the skill does and when to use it (max 1024 chars)
    pub description: String,
    /// Optional version; `latest` when absent
    #[serde(default)]
    pub version: Option<String>,
    /// Optional author
    #[serde(default)]
    pub author: Option<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Load a skill directory into a [`SkillRecord`].
///
/// With `with_content` false only the frontmatter is kept (discovery phase);
/// the SKILL.md body can be loaded later.
pub fn load_skill_dir(dir: &Path, with_content: bool) -> Result<SkillRecord> {
    let skill_file = dir.join("SKILL.md");

    if !skill_file.exists() {
        return Err(anyhow!("SKILL.md not found in {:?}", dir));
    }

    let content = fs::read_to_string(&skill_file)
        .with_context(|| format!("Failed to read {:?}", skill_file))?;

    let (metadata, _) = parse_skill_content(&content)
        .with_context(|| format!("Failed to parse skill from {:?}", skill_file))?;

    validate_metadata(&metadata)?;

    let dir_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(metadata.name.as_str())
        .to_string();
    let id = skill_id(&dir_name, metadata.version.as_deref());

    let mut record = SkillRecord::new(id, metadata.name, metadata.description)
        .with_path(dir)
        .with_tags(metadata.tags);
    record.author = metadata.author;
    if let Some(version) = metadata.version {
        record.version = version;
    }
    if with_content {
        record.content = Some(content);
    }

    collect_files(dir, dir, &mut record)?;
    debug!(
        "Loaded skill {} ({} scripts, {} references, {} resources)",
        record.id,
        record.scripts.len(),
        record.references.len(),
        record.resources.len()
    );
    Ok(record)
}

/// `dir` or `dir@version` for pinned versions
fn skill_id(dir_name: &str, version: Option<&str>) -> String {
    match version {
        Some(v) if !v.is_empty() && v != "latest" => format!("{}@{}", dir_name, v),
        _ => dir_name.to_string(),
    }
}

fn is_ignored(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.starts_with('.') || IGNORED_NAMES.contains(&name) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IGNORED_EXTENSIONS.contains(&e))
}

fn classify(relative: &Path) -> SkillFileKind {
    let ext = relative
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if SCRIPT_EXTENSIONS.contains(&ext.as_str()) {
        SkillFileKind::Script
    } else if REFERENCE_EXTENSIONS.contains(&ext.as_str()) || relative.starts_with("references") {
        SkillFileKind::Reference
    } else {
        SkillFileKind::Resource
    }
}

/// Walk the skill directory and sort every bundled file into the record
fn collect_files(root: &Path, dir: &Path, record: &mut SkillRecord) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {:?}", dir))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if is_ignored(&path) {
            continue;
        }
        if path.is_dir() {
            collect_files(root, &path, record)?;
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);
        if relative == Path::new("SKILL.md") {
            continue;
        }

        let name = relative.to_string_lossy().replace('\\', "/");
        let kind = classify(relative);
        let file = SkillFile::new(name, kind, &path);
        match kind {
            SkillFileKind::Script => record.scripts.push(file),
            SkillFileKind::Reference => record.references.push(file),
            SkillFileKind::Resource => record.resources.push(file),
        }
    }
    Ok(())
}

/// Parse skill content to extract frontmatter metadata and body
pub(crate) fn parse_skill_content(content: &str) -> Result<(SkillMetadata, String)> {
    let frontmatter_re = Regex::new(r"^---\s*\n([\s\S]*?)\n---\s*\n?([\s\S]*)$")
        .map_err(|e| anyhow!("Failed to compile regex: {}", e))?;

    let normalized = content.replace("\r\n", "\n");
    let captures = frontmatter_re
        .captures(&normalized)
        .ok_or_else(|| anyhow!("No valid YAML frontmatter found"))?;

    let yaml_str = captures
        .get(1)
        .ok_or_else(|| anyhow!("Failed to extract frontmatter"))?
        .as_str();

    let body = captures.get(2).map(|m| m.as_str()).unwrap_or("");

    let metadata: SkillMetadata =
        serde_yaml::from_str(yaml_str).with_context(|| "Failed to parse YAML frontmatter")?;

    Ok((metadata, body.to_string()))
}

/// Validate name and description constraints
fn validate_metadata(metadata: &SkillMetadata) -> Result<()> {
    if metadata.name.is_empty() {
        return Err(anyhow!("Skill name cannot be empty"));
    }

    if metadata.name.len() > MAX_NAME_LENGTH {
        warn!(
            "Skill name '{}' exceeds {} characters (was {})",
            metadata.name,
            MAX_NAME_LENGTH,
            metadata.name.len()
        );
    }

    let name_re = Regex::new(r"^[a-z0-9-]+$")
        .map_err(|e| anyhow!("Failed to compile name validation regex: {}", e))?;

    if !name_re.is_match(&metadata.name) {
        return Err(anyhow!(
            "Skill name '{}' must contain only lowercase letters, numbers, and hyphens",
            metadata.name
        ));
    }

    if metadata.description.trim().is_empty() {
        return Err(anyhow!("Skill description cannot be empty"));
    }

    if metadata.description.len() > MAX_DESCRIPTION_LENGTH {
        warn!(
            "Skill '{}' description exceeds {} characters (was {})",
            metadata.name,
            MAX_DESCRIPTION_LENGTH,
            metadata.description.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF_SKILL: &str = r#"---
name: pdf
description: Extract text and tables from PDF files. Use when the task mentions PDFs.
version: "1.2"
tags: [documents, extraction]
---

# PDF

Run `scripts/extract.py <file>`.
"#;

    #[test]
    fn test_parse_skill_content() {
        let (metadata, body) = parse_skill_content(PDF_SKILL).unwrap();
        assert_eq!(metadata.name, "pdf");
        assert_eq!(metadata.version.as_deref(), Some("1.2"));
        assert_eq!(metadata.tags, vec!["documents", "extraction"]);
        assert!(body.contains("# PDF"));
    }

    #[test]
    fn test_validate_metadata() {
        let (valid, _) = parse_skill_content(PDF_SKILL).unwrap();
        assert!(validate_metadata(&valid).is_ok());

        let invalid = SkillMetadata {
            name: "Invalid_Name".to_string(),
            ..valid.clone()
        };
        assert!(validate_metadata(&invalid).is_err());

        let blank = SkillMetadata {
            description: "  ".to_string(),
            ..valid
        };
        assert!(validate_metadata(&blank).is_err());
    }

    #[test]
    fn test_skill_id() {
        assert_eq!(skill_id("pdf", None), "pdf");
        assert_eq!(skill_id("pdf", Some("latest")), "pdf");
        assert_eq!(skill_id("pdf", Some("1.2")), "pdf@1.2");
    }

    #[test]
    fn test_load_skill_dir_classifies_files() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("pdf");
        fs::create_dir_all(skill_dir.join("scripts")).unwrap();
        fs::create_dir_all(skill_dir.join("references")).unwrap();
        fs::create_dir_all(skill_dir.join("__pycache__")).unwrap();
        fs::write(skill_dir.join("SKILL.md"), PDF_SKILL).unwrap();
        fs::write(skill_dir.join("scripts/extract.py"), "print('hi')").unwrap();
        fs::write(skill_dir.join("references/schema.json"), "{}").unwrap();
        fs::write(skill_dir.join("forms.md"), "# forms").unwrap();
        fs::write(skill_dir.join("template.xlsx"), "bin").unwrap();
        fs::write(skill_dir.join("__pycache__/x.pyc"), "bin").unwrap();
        fs::write(skill_dir.join(".hidden"), "x").unwrap();

        let record = load_skill_dir(&skill_dir, false).unwrap();
        assert_eq!(record.id, "pdf@1.2");
        assert_eq!(record.version, "1.2");
        assert!(record.content.is_none());

        let names = |files: &[SkillFile]| files.iter().map(|f| f.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&record.scripts), vec!["scripts/extract.py"]);
        assert_eq!(names(&record.references), vec!["forms.md", "references/schema.json"]);
        assert_eq!(names(&record.resources), vec!["template.xlsx"]);
    }

    #[test]
    fn test_missing_skill_md() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_skill_dir(dir.path(), true).is_err());
    }
}
