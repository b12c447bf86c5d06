//! Per-run working branches.
//!
//! `ensure_branch` leaves the repository checked out on `run_id` with its tip at the base
//! commit. A branch left over from an earlier run is reset, discarding whatever the agent
//! committed or left in the work tree there.

use std::path::Path;

use anyhow::{Context, Result};

use crate::errors::repo_state_error;
use crate::git::{branch_exists, current_branch, git_checked, git_status_porcelain, is_work_tree, resolve_commit};

/// What `ensure_branch` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSetup {
    Created,
    Reused,
    Reset,
}

pub fn ensure_branch(repo: &Path, run_id: &str, base_commit: &str) -> Result<BranchSetup> {
    if !is_work_tree(repo) {
        return Err(repo_state_error(format!(
            "{} is not a git repo. Check if base_dir is correctly specified.",
            repo.display()
        )));
    }
    let base_sha = resolve_commit(repo, base_commit).ok_or_else(|| {
        repo_state_error(format!(
            "base commit {base_commit} not found in {}",
            repo.display()
        ))
    })?;

    let setup = if branch_exists(repo, run_id) {
        if current_branch(repo).as_deref() != Some(run_id) {
            // -f: a previous run may have left edits behind; they are discarded below anyway.
            git_checked(repo, &["checkout", "-f", run_id])
                .with_context(|| format!("failed to check out branch {run_id}"))?;
        }
        let tip = resolve_commit(repo, run_id).unwrap_or_default();
        let dirty = git_status_porcelain(repo)
            .map(|s| s.lines().any(|l| !l.is_empty() && !l.starts_with("??")))
            .unwrap_or(false);
        if tip != base_sha || dirty {
            tracing::warn!(
                repo = %repo.display(),
                branch = run_id,
                tip = %tip,
                base = %base_sha,
                dirty,
                "resetting stale run branch to base commit"
            );
            git_checked(repo, &["reset", "--hard", &base_sha])
                .with_context(|| format!("failed to reset {run_id} to {base_sha}"))?;
            BranchSetup::Reset
        } else {
            BranchSetup::Reused
        }
    } else {
        git_checked(repo, &["checkout", "-f", "-b", run_id, &base_sha])
            .with_context(|| format!("failed to create branch {run_id} at {base_sha}"))?;
        BranchSetup::Created
    };

    let tip = resolve_commit(repo, run_id).unwrap_or_default();
    if tip != base_sha {
        return Err(repo_state_error(format!(
            "branch {run_id} in {} is at {tip} after setup, expected {base_sha}",
            repo.display()
        )));
    }
    tracing::info!(repo = %repo.display(), branch = run_id, ?setup, "run branch ready");
    Ok(setup)
}
