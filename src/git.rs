//! Thin wrappers over the `git` binary. Every call passes `-C <repo>` so nothing here
//! depends on the process working directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};

/// Run a git command with optional -C <repo>. Returns Output on invocation success.
pub fn git(repo: Option<&Path>, args: &[&str]) -> std::io::Result<Output> {
    let mut cmd = Command::new("git");
    if let Some(r) = repo {
        cmd.arg("-C").arg(r);
    }
    for a in args {
        cmd.arg(a);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.output()
}

/// Run a git command and capture trimmed stdout as UTF-8 String on success.
pub fn git_stdout_str(repo: Option<&Path>, args: &[&str]) -> Option<String> {
    git(repo, args).ok().and_then(|o| {
        if o.status.success() {
            Some(String::from_utf8_lossy(&o.stdout).trim().to_string())
        } else {
            None
        }
    })
}

/// Run a git command that must succeed; the error carries git's stderr.
pub fn git_checked(repo: &Path, args: &[&str]) -> Result<String> {
    let out = git(Some(repo), args)
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    } else {
        anyhow::bail!(
            "git {} failed in {}: {}",
            args.join(" "),
            repo.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )
    }
}

/// True when `repo` is inside a git work tree.
pub fn is_work_tree(repo: &Path) -> bool {
    repo.is_dir()
        && git_stdout_str(Some(repo), &["rev-parse", "--is-inside-work-tree"]).as_deref()
            == Some("true")
}

/// Absolute path of the repository's git directory (handles `.git` files of worktrees).
pub fn git_dir(repo: &Path) -> Option<PathBuf> {
    git_stdout_str(Some(repo), &["rev-parse", "--absolute-git-dir"]).map(PathBuf::from)
}

/// Full commit sha a revision resolves to, if any.
pub fn resolve_commit(repo: &Path, rev: &str) -> Option<String> {
    let spec = format!("{rev}^{{commit}}");
    git_stdout_str(Some(repo), &["rev-parse", "--verify", "--quiet", &spec])
}

pub fn branch_exists(repo: &Path, branch: &str) -> bool {
    let r = format!("refs/heads/{branch}");
    git(Some(repo), &["show-ref", "--verify", "--quiet", &r])
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Name of the checked-out branch; None when HEAD is detached.
pub fn current_branch(repo: &Path) -> Option<String> {
    git_stdout_str(Some(repo), &["symbolic-ref", "--quiet", "--short", "HEAD"])
}

/// Get porcelain v1 status as string (empty when clean). None if git invocation failed.
pub fn git_status_porcelain(repo: &Path) -> Option<String> {
    git(Some(repo), &["status", "--porcelain=v1", "-uall"])
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
}
