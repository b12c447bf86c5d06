//! Run and workspace configuration files (YAML).
//!
//! `RunConfig` describes one orchestration run (agent, model, feedback switches, retry policy).
//! `WorkspaceConfig` says where repositories, the dataset export and logs live.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::config_error;
use crate::util::fs::{absolutize, expand_tilde};
use crate::util::{ref_safe_label, sanitize_label};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(4);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);
pub const DEFAULT_TEST_CMD_TEMPLATE: &str =
    "python -m commit0 test {repo_path} {test_file} --branch {run_id}";
pub const DEFAULT_PROMPT: &str = "Here is your task:\n\
You need to complete the implementations for all functions (i.e., those with pass \
statements) and pass the unit tests.\n\
Do not change the names of existing functions or classes, as they may be referenced \
from other code like unit tests, etc.\n\
When you generate code, you must maintain the original formatting of the function \
stubs (such as whitespaces), otherwise we will not able to search/replace blocks \
for code modifications, and therefore you will receive a score of 0 for your \
generated code.";

/// Immutable configuration for one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub agent_name: String,
    pub model_name: String,
    pub max_iteration: u32,
    pub run_tests: bool,
    pub use_lint_info: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base", with = "humantime_serde_compat")]
    pub backoff_base: Duration,
    #[serde(default = "default_backoff_cap", with = "humantime_serde_compat")]
    pub backoff_cap: Duration,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-attempt deadline for the agent process; absent means no deadline.
    #[serde(default, with = "humantime_serde_opt")]
    pub agent_timeout: Option<Duration>,
    /// Executable that drives the agent. For aider, a Python interpreter with `aider-chat`
    /// installed.
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,
    #[serde(default = "default_prompt")]
    pub user_prompt: String,
    #[serde(default = "default_test_cmd_template")]
    pub test_cmd_template: String,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_base() -> Duration {
    DEFAULT_BACKOFF_BASE
}
fn default_backoff_cap() -> Duration {
    DEFAULT_BACKOFF_CAP
}
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_agent_binary() -> String {
    "python3".to_string()
}
fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}
fn default_test_cmd_template() -> String {
    DEFAULT_TEST_CMD_TEMPLATE.to_string()
}

impl RunConfig {
    /// Minimal configuration with every optional field at its default.
    pub fn new(agent_name: &str, model_name: &str, max_iteration: u32) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            model_name: model_name.to_string(),
            max_iteration,
            run_tests: false,
            use_lint_info: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            concurrency: DEFAULT_CONCURRENCY,
            agent_timeout: None,
            agent_binary: default_agent_binary(),
            user_prompt: default_prompt(),
            test_cmd_template: default_test_cmd_template(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(config_error(format!(
                "the config file '{}' does not exist",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let cfg: RunConfig = serde_yaml::from_str(&text).map_err(|e| {
            config_error(format!("invalid run config {}: {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_name.trim().is_empty() {
            return Err(config_error("agent_name must not be empty"));
        }
        if self.model_name.trim().is_empty() {
            return Err(config_error("model_name must not be empty"));
        }
        if self.max_iteration == 0 {
            return Err(config_error("max_iteration must be a positive integer"));
        }
        if self.max_attempts == 0 {
            return Err(config_error("max_attempts must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(config_error("concurrency must be at least 1"));
        }
        if self.backoff_base > self.backoff_cap {
            return Err(config_error(format!(
                "backoff_base ({}) exceeds backoff_cap ({})",
                humantime::format_duration(self.backoff_base),
                humantime::format_duration(self.backoff_cap)
            )));
        }
        crate::util::reject_newlines(&self.test_cmd_template, "test command template")
            .map_err(config_error)?;
        Ok(())
    }

    /// Branch name for this configuration. Deterministic in the fields that change what the
    /// agent does, so reruns land on (and reset) the same branch.
    pub fn run_id(&self) -> String {
        format!(
            "{}-{}-iter{}-{}-{}",
            sanitize_label(&self.agent_name, ""),
            ref_safe_label(&self.model_name),
            self.max_iteration,
            if self.run_tests { "tests" } else { "notests" },
            if self.use_lint_info { "lint" } else { "nolint" },
        )
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize run config")
    }
}

/// Where the fleet lives: dataset export, repository checkouts, logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Local JSON/JSONL export of the benchmark dataset.
    pub dataset_name: PathBuf,
    #[serde(default)]
    pub dataset_split: Option<String>,
    #[serde(default = "default_repo_split")]
    pub repo_split: String,
    pub base_dir: PathBuf,
    #[serde(default)]
    pub test_ids_dir: Option<PathBuf>,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Named repository subsets; `all` is implicit.
    #[serde(default)]
    pub splits: BTreeMap<String, Vec<String>>,
}

fn default_repo_split() -> String {
    "all".to_string()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs/aider")
}

impl WorkspaceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(config_error(format!(
                "the workspace file '{}' does not exist",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut cfg: WorkspaceConfig = serde_yaml::from_str(&text).map_err(|e| {
            config_error(format!("invalid workspace file {}: {e}", path.display()))
        })?;
        // absolute: test and lint commands run from inside each checkout
        let anchor = absolutize(path.parent().unwrap_or_else(|| Path::new("")))
            .context("failed to resolve the workspace directory")?;
        let anchor = anchor.as_path();
        cfg.dataset_name = anchor_path(anchor, &cfg.dataset_name);
        cfg.base_dir = anchor_path(anchor, &cfg.base_dir);
        cfg.log_dir = anchor_path(anchor, &cfg.log_dir);
        cfg.test_ids_dir = cfg.test_ids_dir.as_deref().map(|p| anchor_path(anchor, p));
        if cfg.repo_split != "all" && !cfg.splits.contains_key(&cfg.repo_split) {
            return Err(config_error(format!(
                "repo_split '{}' is neither 'all' nor one of the named splits [{}]",
                cfg.repo_split,
                cfg.splits.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(cfg)
    }

    /// Test id lists default to `<base_dir>/.test_ids`.
    pub fn test_ids_dir(&self) -> PathBuf {
        self.test_ids_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join(".test_ids"))
    }
}

/// Relative paths in the workspace file are relative to the file's directory.
fn anchor_path(anchor: &Path, p: &Path) -> PathBuf {
    let p = expand_tilde(p);
    if p.is_absolute() {
        p
    } else {
        anchor.join(p)
    }
}

mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }
}

mod humantime_serde_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        match s.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => humantime::parse_duration(v)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
