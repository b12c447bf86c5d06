use std::path::{Path, PathBuf};

/// Ensure a file exists by creating parent directories as needed.
pub fn ensure_file_exists(p: &Path) -> std::io::Result<()> {
    if !p.exists() {
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(p)?;
    }
    Ok(())
}

/// Expand a leading `~` or `~/` using the user's home directory.
pub fn expand_tilde(p: &Path) -> PathBuf {
    let s = p.to_string_lossy();
    if s == "~" {
        return home::home_dir().unwrap_or_else(|| p.to_path_buf());
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(h) = home::home_dir() {
            return h.join(rest);
        }
    }
    p.to_path_buf()
}

/// Absolute form of `p` without requiring it to exist.
pub fn absolutize(p: &Path) -> std::io::Result<PathBuf> {
    let p = expand_tilde(p);
    if p.is_absolute() {
        Ok(p)
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}
