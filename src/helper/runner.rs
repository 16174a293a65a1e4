use std::collections::BTreeMap;
use std::error::Error;
use std::process::{Command, Output};

use crate::helper::error::ServiceError;

/// How many bytes of a failing tool's stderr to keep in the error.
const STDERR_TAIL: usize = 600;

/// Executable names, keyed by tool (`clustalw`, `raxml`, ...), with user
/// overrides from the config taking precedence over the defaults.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    overrides: BTreeMap<String, String>,
}

impl Toolbox {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Toolbox { overrides }
    }

    pub fn program<'a>(&'a self, tool: &str, default: &'a str) -> &'a str {
        self.overrides
            .get(tool)
            .map(String::as_str)
            .unwrap_or(default)
    }
}

/// Known tools with their default executable and version flag.
pub const KNOWN_TOOLS: [(&str, &str, &str); 8] = [
    ("clustalw", "clustalw", "-help"),
    ("muscle", "muscle", "-version"),
    ("clustalo", "clustalo", "--version"),
    ("mafft", "mafft", "--version"),
    ("t-coffee", "t_coffee", "-version"),
    ("probcons", "probcons", "-help"),
    ("raxml", "raxmlHPC", "-v"),
    ("viewer", "figtree", "-help"),
];

/// Run `cmd` to completion; a non-zero exit becomes `CommandFailed` carrying
/// the tail of stderr.
pub fn run_tool(tool: &str, cmd: &mut Command) -> Result<Output, ServiceError> {
    let output = cmd.output().map_err(|source| ServiceError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(ServiceError::CommandFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let mut start = trimmed.len().saturating_sub(STDERR_TAIL);
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

/// Check that `cmd` can be launched. Some aligners exit non-zero on their
/// help flag, so only a failed spawn counts as missing.
pub fn is_available(cmd: &str, args: &[&str]) -> Result<(), Box<dyn Error>> {
    Command::new(cmd)
        .args(args)
        .output()
        .map(|_| ())
        .map_err(|_| format!("{} is not installed or not found in PATH.", cmd).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolbox_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("raxml".to_string(), "raxmlHPC-PTHREADS".to_string());
        let tools = Toolbox::new(overrides);
        assert_eq!(tools.program("raxml", "raxmlHPC"), "raxmlHPC-PTHREADS");
        assert_eq!(tools.program("mafft", "mafft"), "mafft");
    }

    #[test]
    fn test_is_available() {
        assert!(is_available("definitely_not_a_real_tool", &["--version"]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_reports_failure() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo bad input >&2; exit 3");
        match run_tool("sh", &mut cmd) {
            Err(ServiceError::CommandFailed { tool, stderr, .. }) => {
                assert_eq!(tool, "sh");
                assert_eq!(stderr, "bad input");
            }
            other => panic!("unexpected: {:?}", other.map(|o| o.status)),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf '>a\\nAC-T\\n'");
        let output = run_tool("sh", &mut cmd).unwrap();
        assert_eq!(output.stdout, b">a\nAC-T\n");
    }

    #[test]
    fn test_run_tool_missing_binary() {
        let mut cmd = Command::new("definitely_not_a_real_tool");
        assert!(matches!(
            run_tool("nope", &mut cmd),
            Err(ServiceError::Spawn { .. })
        ));
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = "x".repeat(STDERR_TAIL * 2);
        assert_eq!(stderr_tail(long.as_bytes()).len(), STDERR_TAIL);
    }
}
