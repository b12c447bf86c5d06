use std::path::Path;

use anyhow::Result;
use walkdir::{DirEntry, WalkDir};

/// Resolves the files the agent is allowed to edit, as repository-relative paths.
pub trait TargetFiles: Send + Sync {
    fn target_files(&self, repo_path: &Path, test_dir: &str) -> Result<Vec<String>>;
}

/// What marks a function body as still unimplemented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubMarker {
    /// A line whose code is a bare `pass` statement (the benchmark stub form).
    PassStatement,
    /// Any occurrence of this text.
    Text(String),
}

impl StubMarker {
    fn matches(&self, source: &str) -> bool {
        match self {
            StubMarker::PassStatement => source.lines().any(|line| {
                let code = line.split('#').next().unwrap_or("");
                code.trim() == "pass"
            }),
            StubMarker::Text(t) => source.contains(t.as_str()),
        }
    }
}

/// Python sources outside the test directory that still contain a stub.
#[derive(Debug, Clone)]
pub struct StubScan {
    marker: StubMarker,
}

impl StubScan {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: StubMarker::Text(marker.into()),
        }
    }

    pub fn marker(&self) -> &StubMarker {
        &self.marker
    }
}

impl Default for StubScan {
    fn default() -> Self {
        Self {
            marker: StubMarker::PassStatement,
        }
    }
}

fn is_skipped_dir(e: &DirEntry) -> bool {
    e.file_type().is_dir()
        && e.depth() > 0
        && e.file_name()
            .to_str()
            .map(|n| {
                n.starts_with('.')
                    || matches!(n, "__pycache__" | "node_modules" | "venv" | "build" | "dist")
            })
            .unwrap_or(false)
}

impl TargetFiles for StubScan {
    fn target_files(&self, repo_path: &Path, test_dir: &str) -> Result<Vec<String>> {
        let test_dir = test_dir.trim().trim_end_matches('/');
        let mut out = Vec::new();
        for entry in WalkDir::new(repo_path)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(repo_path) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            if !rel.ends_with(".py") {
                continue;
            }
            if !test_dir.is_empty() && (rel == test_dir || rel.starts_with(&format!("{test_dir}/"))) {
                continue;
            }
            let text = match std::fs::read_to_string(entry.path()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(file = %rel, error = %e, "skipping unreadable file");
                    continue;
                }
            };
            if self.marker.matches(&text) {
                out.push(rel);
            }
        }
        out.sort();
        Ok(out)
    }
}
