//! Per-unit, per-repository and fleet-wide outcome records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::errors::error_kind_label;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Completed,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub label: String,
    pub log_dir: PathBuf,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn from_error(e: &anyhow::Error) -> Self {
        Self {
            kind: error_kind_label(e).to_string(),
            message: format!("{e:#}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    /// Every unit completed (including the empty plan).
    Completed,
    /// Setup succeeded; at least one unit failed or was rejected.
    UnitFailures,
    /// Lock, test discovery, branch or planning failed; no unit ran.
    SetupFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoOutcome {
    pub repo: String,
    pub repo_path: PathBuf,
    pub branch: String,
    pub status: RepoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<ErrorRecord>,
    pub units: Vec<UnitRecord>,
    pub elapsed_ms: u128,
}

impl RepoOutcome {
    pub fn failed_units(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.status != UnitStatus::Completed)
            .count()
    }

    /// One-line summary for progress output.
    pub fn summary(&self) -> String {
        match self.status {
            RepoStatus::Completed => format!("{} units completed", self.units.len()),
            RepoStatus::UnitFailures => format!(
                "{}/{} units failed",
                self.failed_units(),
                self.units.len()
            ),
            RepoStatus::SetupFailed => format!(
                "setup failed: {}",
                self.setup_error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetReport {
    pub run_id: String,
    pub total: usize,
    pub completed: usize,
    pub with_unit_failures: usize,
    pub setup_failed: usize,
    pub repos: Vec<RepoOutcome>,
}

impl FleetReport {
    pub fn new(run_id: &str, mut repos: Vec<RepoOutcome>) -> Self {
        repos.sort_by(|a, b| a.repo.cmp(&b.repo));
        let count = |s: RepoStatus| repos.iter().filter(|r| r.status == s).count();
        Self {
            run_id: run_id.to_string(),
            total: repos.len(),
            completed: count(RepoStatus::Completed),
            with_unit_failures: count(RepoStatus::UnitFailures),
            setup_failed: count(RepoStatus::SetupFailed),
            repos,
        }
    }

    /// Identifiers of repositories worth re-running.
    pub fn failed_repos(&self) -> Vec<&str> {
        self.repos
            .iter()
            .filter(|r| r.status != RepoStatus::Completed)
            .map(|r| r.repo.as_str())
            .collect()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
    }
}
