#![allow(clippy::module_name_repetitions)]
//! Small utilities: shell escaping, branch-safe labels, path-to-name flattening.

pub mod exec;
pub mod fs;

/// Reject strings containing newline, carriage return, or NUL before embedding into a shell command.
///
/// Keep error text stable (tests depend on it).
pub fn reject_newlines(s: &str, what: &str) -> Result<(), String> {
    if s.contains('\n') || s.contains('\r') || s.contains('\0') {
        Err(format!("refusing to execute {what}: contains newline"))
    } else {
        Ok(())
    }
}

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

/// Lowercase and collapse anything outside [a-z0-9] into single dashes, keeping
/// `keep` characters as-is. Leading/trailing separators are trimmed.
pub fn sanitize_label(s: &str, keep: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_dash = false;
    for ch in s.chars().map(|c| c.to_ascii_lowercase()) {
        if ch.is_ascii_alphanumeric() || keep.contains(ch) {
            out.push(ch);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    while matches!(out.chars().last(), Some('-') | Some('.')) {
        out.pop();
    }
    out
}

/// `sanitize_label` that keeps dots but never yields `..` or a `.lock` suffix, both of
/// which git rejects in ref names.
pub fn ref_safe_label(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in sanitize_label(s, ".").chars() {
        if ch == '.' && out.ends_with('.') {
            continue;
        }
        out.push(ch);
    }
    loop {
        let trimmed = out.trim_end_matches(['.', '-']);
        match trimmed.strip_suffix(".lock") {
            Some(rest) => out = rest.to_string(),
            None => {
                out = trimmed.to_string();
                break;
            }
        }
    }
    out
}

/// Flatten a repository-relative file path into a single directory name:
/// drop a trailing `.py`, then `/` becomes `__`.
pub fn flatten_file_name(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches("./");
    let stem = trimmed.strip_suffix(".py").unwrap_or(trimmed);
    stem.replace('\\', "/").replace('/', "__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_escape_simple() {
        assert_eq!(shell_escape("abc-123_./:@"), "abc-123_./:@");
    }

    #[test]
    fn test_shell_escape_with_spaces_and_quotes() {
        assert_eq!(shell_escape("a b c"), "'a b c'");
        assert_eq!(shell_escape("O'Reilly"), "'O'\"'\"'Reilly'");
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn test_shell_join() {
        let args = vec!["a".to_string(), "b c".to_string(), "d".to_string()];
        assert_eq!(shell_join(&args), "a 'b c' d");
    }

    #[test]
    fn test_reject_newlines() {
        assert!(reject_newlines("ok", "cmd").is_ok());
        assert_eq!(
            reject_newlines("a\nb", "lint command").unwrap_err(),
            "refusing to execute lint command: contains newline"
        );
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("GPT-4o/mini 2024", ""), "gpt-4o-mini-2024");
        assert_eq!(sanitize_label("openai/gpt-4.1", "."), "openai-gpt-4.1");
        assert_eq!(sanitize_label("--x--", ""), "x");
    }

    #[test]
    fn test_ref_safe_label() {
        assert_eq!(ref_safe_label("openai/gpt-4.1"), "openai-gpt-4.1");
        assert_eq!(ref_safe_label("my..model"), "my.model");
        assert_eq!(ref_safe_label("weird.lock"), "weird");
        assert_eq!(ref_safe_label("a.lock.lock."), "a");
        assert_eq!(ref_safe_label("x.locksmith"), "x.locksmith");
    }

    #[test]
    fn test_flatten_file_name() {
        assert_eq!(flatten_file_name("tests/test_a.py"), "tests__test_a");
        assert_eq!(flatten_file_name("src/pkg/mod.py"), "src__pkg__mod");
        assert_eq!(flatten_file_name("./setup.cfg"), "setup.cfg");
        assert_ne!(
            flatten_file_name("a/b_c.py"),
            flatten_file_name("a_b/c.py")
        );
    }
}
