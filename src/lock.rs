use fs2::FileExt;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Repository-scoped lock guard that removes the lock file on drop.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // Best-effort unlock; ignore errors
        let _ = self.file.unlock();

        // Try removal with brief retries (avoid background threads to keep tests leak-free)
        for _ in 0..10 {
            if !self.path.exists() {
                break;
            }
            if fs::remove_file(&self.path).is_ok() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }
}

/// Acquire a non-blocking exclusive lock for driving `repo`. Tries the candidates from
/// `candidate_lock_paths` in order; a held lock fails immediately as a repository-state error.
pub fn acquire_repo_lock(repo: &Path) -> anyhow::Result<RepoLock> {
    let paths = candidate_lock_paths(repo);
    let mut last_err: Option<io::Error> = None;

    for p in &paths {
        match acquire_lock_at(p) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::error!(path = %p.display(), "lock held by another process");
                return Err(crate::errors::repo_state_error(format!(
                    "another fleet run is already driving {} (lock held at {})",
                    repo.display(),
                    p.display()
                )));
            }
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        }
    }

    let mut msg = String::from("failed to create lock file in any candidate location: ");
    msg.push_str(
        &paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );
    if let Some(e) = last_err {
        msg.push_str(&format!(" (last error: {e})"));
    }
    Err(crate::errors::repo_state_error(msg))
}

/// Acquire a lock at a specific path. A held lock surfaces as `WouldBlock`.
pub fn acquire_lock_at(p: &Path) -> io::Result<RepoLock> {
    if let Some(parent) = p.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(p)?;
    match f.try_lock_exclusive() {
        Ok(_) => Ok(RepoLock {
            file: f,
            path: p.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "lock held by another process",
        )),
        Err(e) => {
            // fs2 reports contention as EWOULDBLOCK on unix; normalize other spellings.
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "lock held by another process",
                ))
            } else {
                Err(e)
            }
        }
    }
}

/// Return true if repository locks should be taken for this process.
/// Honor FLEET_CODER_SKIP_LOCK=1 to skip acquiring any lock.
pub fn should_acquire_lock() -> bool {
    env::var("FLEET_CODER_SKIP_LOCK").ok().as_deref() != Some("1")
}

/// Candidate lock file locations for a repository:
///   1) <git_dir>/fleet-coder.lock (keeps the work tree clean for the agent)
///   2) <xdg_runtime or tmp>/fleet-coder.<hash(repo)>.lock
pub fn candidate_lock_paths(repo: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(gd) = crate::git::git_dir(repo) {
        paths.push(gd.join("fleet-coder.lock"));
    }
    let rt_base = env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    let key = normalized_repo_key_for_hash(repo);
    paths.push(rt_base.join(format!("fleet-coder.{}.lock", hash_repo_key_hex(&key))));
    paths
}

/// Normalize a repository path string for hashing to a stable key.
pub fn normalized_repo_key_for_hash(p: &Path) -> String {
    let abs = fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    abs.to_string_lossy().to_string()
}

/// Simple stable 64-bit FNV-1a hash for strings; returns 16-hex lowercase id.
pub fn hash_repo_key_hex(s: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 1099511628211;
    let mut h: u64 = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    format!("{:016x}", h)
}
