//! The external code-editing capability.
//!
//! The orchestrator sees an agent only through `CodingAgent`: given instruction text, the
//! files it may edit, optional test/lint commands and a set of log files, it edits files in
//! the working directory and reports success or failure.

pub mod aider;

use std::path::{Path, PathBuf};

use anyhow::Result;

pub use aider::AiderAgent;

use crate::config::RunConfig;
use crate::errors::config_error;

pub const INPUT_HISTORY_FILE: &str = ".aider.input.history";
pub const CHAT_HISTORY_FILE: &str = ".aider.chat.history.md";
pub const LOG_FILE: &str = "aider.log";

/// Files one work unit's diagnostics are confined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitLogs {
    pub dir: PathBuf,
    pub input_history: PathBuf,
    pub chat_history: PathBuf,
    pub log_file: PathBuf,
}

impl UnitLogs {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            input_history: dir.join(INPUT_HISTORY_FILE),
            chat_history: dir.join(CHAT_HISTORY_FILE),
            log_file: dir.join(LOG_FILE),
        }
    }
}

/// One call's worth of input for an agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub instruction: &'a str,
    pub files: &'a [String],
    /// Auto-test runs only when present.
    pub test_cmd: Option<&'a str>,
    /// Auto-lint runs only when non-empty.
    pub lint_cmd: &'a str,
    /// Repository checkout the agent works in.
    pub workdir: &'a Path,
    pub logs: &'a UnitLogs,
}

impl AgentRequest<'_> {
    pub fn auto_test(&self) -> bool {
        self.test_cmd.map(|c| !c.trim().is_empty()).unwrap_or(false)
    }

    pub fn auto_lint(&self) -> bool {
        !self.lint_cmd.trim().is_empty()
    }
}

pub trait CodingAgent: Send + Sync {
    fn name(&self) -> &str;

    /// Run the agent once. Errors are whatever went wrong on this attempt; retrying is
    /// the caller's business.
    fn run(&self, request: &AgentRequest<'_>) -> Result<()>;
}

/// Build the agent a configuration names. Unknown variants fail fast.
pub fn create_agent(config: &RunConfig) -> Result<Box<dyn CodingAgent>> {
    match config.agent_name.trim().to_ascii_lowercase().as_str() {
        "aider" => Ok(Box::new(AiderAgent::from_config(config))),
        other => Err(config_error(format!(
            "agent '{other}' is not implemented; add an implementation under src/agent/"
        ))),
    }
}

/// Locate the agent executable on PATH (or accept an explicit path).
pub fn resolve_agent_binary(config: &RunConfig) -> Result<PathBuf> {
    let bin = Path::new(&config.agent_binary);
    if bin.components().count() > 1 {
        if bin.is_file() {
            return Ok(bin.to_path_buf());
        }
        return Err(config_error(format!(
            "agent binary {} does not exist",
            bin.display()
        )));
    }
    which::which(&config.agent_binary).map_err(|e| {
        config_error(format!(
            "agent binary '{}' not found in PATH ({e})",
            config.agent_binary
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_agent_is_not_implemented() {
        let cfg = RunConfig::new("swe-agent", "m", 1);
        let err = create_agent(&cfg).err().expect("must fail");
        assert_eq!(crate::errors::error_kind_label(&err), "config");
        assert!(err.to_string().contains("not implemented"));
    }

    #[test]
    fn test_aider_is_known() {
        let cfg = RunConfig::new("Aider", "m", 1);
        let agent = create_agent(&cfg).expect("aider");
        assert_eq!(agent.name(), "aider");
    }

    #[test]
    fn test_request_mode_flags() {
        let logs = UnitLogs::in_dir(Path::new("/logs/u"));
        let files = vec!["a.py".to_string()];
        let mut req = AgentRequest {
            instruction: "do it",
            files: &files,
            test_cmd: None,
            lint_cmd: "",
            workdir: Path::new("/r"),
            logs: &logs,
        };
        assert!(!req.auto_test());
        assert!(!req.auto_lint());
        req.test_cmd = Some("pytest tests/test_a.py");
        req.lint_cmd = "pre-commit run --files";
        assert!(req.auto_test());
        assert!(req.auto_lint());
        assert_eq!(logs.log_file, PathBuf::from("/logs/u/aider.log"));
    }

    #[test]
    fn test_missing_binary_is_config_error() {
        let mut cfg = RunConfig::new("aider", "m", 1);
        cfg.agent_binary = "fleet-coder-no-such-agent-binary".to_string();
        let err = resolve_agent_binary(&cfg).expect_err("missing");
        assert_eq!(crate::errors::error_kind_label(&err), "config");
    }
}
