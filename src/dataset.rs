//! Benchmark dataset records and repository selection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::config_error;

/// Nested test descriptor as exported by the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub test_dir: String,
}

/// One unit of fleet work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryTarget {
    /// `org/name`
    pub repo: String,
    pub base_commit: String,
    pub test: TestSpec,
    /// Dataset split label carried by some exports (e.g. `test`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
}

impl RepositoryTarget {
    /// Trailing path segment of the identifier, as written in the dataset.
    pub fn short_name(&self) -> &str {
        self.repo.rsplit('/').next().unwrap_or(&self.repo)
    }

    /// Directory name of the checkout under `base_dir`: lowercased, `.` becomes `-`.
    pub fn dir_name(&self) -> String {
        self.short_name().to_lowercase().replace('.', "-")
    }

    pub fn repo_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.dir_name())
    }
}

/// Source of repository records.
pub trait DatasetSource {
    fn load(&self) -> Result<Vec<RepositoryTarget>>;
}

/// Local dataset export: either a JSON array or one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonDataset {
    path: PathBuf,
    split: Option<String>,
}

impl JsonDataset {
    pub fn new(path: impl Into<PathBuf>, split: Option<String>) -> Self {
        Self {
            path: path.into(),
            split,
        }
    }
}

impl DatasetSource for JsonDataset {
    fn load(&self) -> Result<Vec<RepositoryTarget>> {
        if !self.path.exists() {
            return Err(config_error(format!(
                "dataset export '{}' does not exist",
                self.path.display()
            )));
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read dataset {}", self.path.display()))?;
        let records = parse_records(&text)
            .with_context(|| format!("failed to parse dataset {}", self.path.display()))?;
        Ok(match self.split.as_deref() {
            Some(want) => records
                .into_iter()
                .filter(|r| r.split.as_deref().map(|s| s == want).unwrap_or(true))
                .collect(),
            None => records,
        })
    }
}

fn parse_records(text: &str) -> Result<Vec<RepositoryTarget>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let rec: RepositoryTarget =
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))?;
        out.push(rec);
    }
    Ok(out)
}

/// Keep the records selected by `repo_split`: everything for `all`, otherwise the records
/// whose trailing identifier segment is listed under that split name.
pub fn filter_targets(
    records: Vec<RepositoryTarget>,
    repo_split: &str,
    splits: &BTreeMap<String, Vec<String>>,
) -> Vec<RepositoryTarget> {
    if repo_split == "all" {
        return records;
    }
    let wanted: &[String] = splits.get(repo_split).map(Vec::as_slice).unwrap_or(&[]);
    records
        .into_iter()
        .filter(|r| wanted.iter().any(|w| w == r.short_name()))
        .collect()
}
