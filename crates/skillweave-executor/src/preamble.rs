//! Environment preambles prepended to executed code.
//!
//! The same builders serve both backends; only the [`WorkspaceView`] paths
//! differ (host paths locally, `/sandbox/...` inside a container).

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Workspace root inside the sandbox container
pub const SANDBOX_ROOT: &str = "/sandbox";

/// Workspace directories as seen by the executed code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceView {
    pub root: String,
    pub outputs: String,
    pub scripts: String,
    pub logs: String,
    pub inputs: String,
}

impl WorkspaceView {
    /// Host view of a workspace directory
    pub fn host(root: &Path) -> Self {
        let sub = |name: &str| root.join(name).display().to_string();
        Self {
            root: root.display().to_string(),
            outputs: sub("outputs"),
            scripts: sub("scripts"),
            logs: sub("logs"),
            inputs: sub("inputs"),
        }
    }

    /// Sandbox view: the workspace is mounted at [`SANDBOX_ROOT`]
    pub fn sandbox() -> Self {
        let sub = |name: &str| format!("{}/{}", SANDBOX_ROOT, name);
        Self {
            root: SANDBOX_ROOT.to_string(),
            outputs: sub("outputs"),
            scripts: sub("scripts"),
            logs: sub("logs"),
            inputs: sub("inputs"),
        }
    }

    /// Map a host path under `host_root` to this view; other paths pass through
    pub fn translate(&self, host_root: &Path, path: &Path) -> String {
        match path.strip_prefix(host_root) {
            Ok(rel) if rel.as_os_str().is_empty() => self.root.clone(),
            Ok(rel) => format!(
                "{}/{}",
                self.root,
                rel.to_string_lossy().replace('\\', "/")
            ),
            Err(_) => path.display().to_string(),
        }
    }

    /// Variables every execution sees
    pub fn base_env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("SKILL_OUTPUT_DIR".to_string(), self.outputs.clone()),
            ("SKILL_LOGS_DIR".to_string(), self.logs.clone()),
            ("SKILL_INPUT_DIR".to_string(), self.inputs.clone()),
        ])
    }
}

/// Double-quoted literal valid in both Python and JavaScript
pub fn literal(s: &str) -> String {
    Value::from(s).to_string()
}

/// POSIX single-quoting
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c == '$' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
}

/// Python prelude: output helpers, optional skill directory, env and argv
pub fn python_preamble(
    view: &WorkspaceView,
    working_dir: Option<&str>,
    env: &BTreeMap<String, String>,
    args: &[String],
) -> String {
    let outputs = literal(&view.outputs);
    let logs = literal(&view.logs);
    let mut lines = vec![
        "import os".to_string(),
        "import sys".to_string(),
        String::new(),
        format!("os.environ['SKILL_OUTPUT_DIR'] = {}", outputs),
        format!("os.environ['SKILL_LOGS_DIR'] = {}", logs),
        format!("os.environ['SKILL_INPUT_DIR'] = {}", literal(&view.inputs)),
        String::new(),
        "def get_output_path(filename):".to_string(),
        "    return os.path.join(os.environ['SKILL_OUTPUT_DIR'], filename)".to_string(),
        String::new(),
        format!("SKILL_OUTPUT_DIR = {}", outputs),
        format!("SKILL_LOGS_DIR = {}", logs),
    ];

    if let Some(dir) = working_dir {
        lines.extend([
            String::new(),
            format!("_skill_dir = {}", literal(dir)),
            "os.environ['SKILL_DIR'] = _skill_dir".to_string(),
            "SKILL_DIR = _skill_dir".to_string(),
            "if _skill_dir not in sys.path:".to_string(),
            "    sys.path.insert(0, _skill_dir)".to_string(),
            "os.chdir(_skill_dir)".to_string(),
        ]);
    }

    for (key, value) in env {
        lines.push(format!("os.environ[{}] = {}", literal(key), literal(value)));
    }

    if !args.is_empty() {
        let list = args.iter().map(|a| literal(a)).collect::<Vec<_>>().join(", ");
        lines.extend([
            String::new(),
            format!("ARGS = [{}]", list),
            r#"sys.argv = ["script.py"] + [str(a) for a in ARGS]"#.to_string(),
        ]);
    }

    lines.push(String::new());
    lines.join("\n")
}

/// JavaScript prelude: `process.env` assignments
pub fn js_preamble(view: &WorkspaceView, env: &BTreeMap<String, String>) -> String {
    let mut lines = vec![
        format!("process.env.SKILL_OUTPUT_DIR = {};", literal(&view.outputs)),
        format!("process.env.SKILL_LOGS_DIR = {};", literal(&view.logs)),
    ];
    for (key, value) in env {
        if is_identifier(key) {
            lines.push(format!("process.env.{} = {};", key, literal(value)));
        } else {
            lines.push(format!("process.env[{}] = {};", literal(key), literal(value)));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

/// `export K='v' && ... && set -- args && command`
///
/// Positional args become `$1..` and are also joined into `SKILL_ARGS`.
pub fn shell_with_exports(env: &BTreeMap<String, String>, args: &[String], command: &str) -> String {
    if env.is_empty() && args.is_empty() {
        return command.to_string();
    }
    let export = |k: &str, v: &str| {
        if cfg!(windows) {
            format!("set {}={}", k, v)
        } else {
            format!("export {}={}", k, shell_quote(v))
        }
    };

    let mut parts: Vec<String> = env.iter().map(|(k, v)| export(k, v)).collect();
    if !args.is_empty() {
        parts.push(export("SKILL_ARGS", &args.join(" ")));
        if !cfg!(windows) {
            let quoted = args.iter().map(|a| shell_quote(a)).collect::<Vec<_>>();
            parts.push(format!("set -- {}", quoted.join(" ")));
        }
    }
    parts.push(command.to_string());
    parts.join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_literal_escapes() {
        assert_eq!(literal("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(literal("it's"), r#""it's""#);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_python_preamble_full() {
        let view = WorkspaceView::sandbox();
        let code = python_preamble(
            &view,
            Some("/sandbox/skills/pdf"),
            &env(&[("MODE", "fast")]),
            &["in.pdf".to_string(), "2".to_string()],
        );

        assert!(code.starts_with("import os\nimport sys\n"));
        assert!(code.contains("os.environ['SKILL_OUTPUT_DIR'] = \"/sandbox/outputs\""));
        assert!(code.contains("def get_output_path(filename):"));
        assert!(code.contains("SKILL_LOGS_DIR = \"/sandbox/logs\""));
        assert!(code.contains("_skill_dir = \"/sandbox/skills/pdf\""));
        assert!(code.contains("os.chdir(_skill_dir)"));
        assert!(code.contains("os.environ[\"MODE\"] = \"fast\""));
        assert!(code.contains("ARGS = [\"in.pdf\", \"2\"]"));
        assert!(code.contains("sys.argv = [\"script.py\"] + [str(a) for a in ARGS]"));
    }

    #[test]
    fn test_python_preamble_minimal() {
        let view = WorkspaceView::host(Path::new("/tmp/ws"));
        let code = python_preamble(&view, None, &BTreeMap::new(), &[]);

        assert!(code.contains("\"/tmp/ws/outputs\""));
        assert!(!code.contains("_skill_dir"));
        assert!(!code.contains("ARGS"));
    }

    #[test]
    fn test_js_preamble() {
        let view = WorkspaceView::sandbox();
        let code = js_preamble(&view, &env(&[("API_MODE", "x"), ("odd-key", "y")]));

        assert!(code.contains("process.env.SKILL_OUTPUT_DIR = \"/sandbox/outputs\";"));
        assert!(code.contains("process.env.API_MODE = \"x\";"));
        assert!(code.contains("process.env[\"odd-key\"] = \"y\";"));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_with_exports() {
        assert_eq!(shell_with_exports(&BTreeMap::new(), &[], "ls"), "ls");
        assert_eq!(
            shell_with_exports(&env(&[("A", "1"), ("B", "it's")]), &[], "echo $A"),
            r"export A='1' && export B='it'\''s' && echo $A"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_positional_args() {
        let args = vec!["a b".to_string(), "c".to_string()];
        assert_eq!(
            shell_with_exports(&BTreeMap::new(), &args, "echo $1"),
            "export SKILL_ARGS='a b c' && set -- 'a b' 'c' && echo $1"
        );
    }

    #[test]
    fn test_translate() {
        let view = WorkspaceView::sandbox();
        let host = Path::new("/tmp/ws");
        assert_eq!(view.translate(host, Path::new("/tmp/ws")), "/sandbox");
        assert_eq!(
            view.translate(host, Path::new("/tmp/ws/scripts/a.py")),
            "/sandbox/scripts/a.py"
        );
        assert_eq!(view.translate(host, Path::new("/opt/x")), "/opt/x");
    }
}
