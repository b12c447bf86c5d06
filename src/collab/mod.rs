//! Collaborators the orchestrator consumes through narrow interfaces: test discovery,
//! instruction text, lint command, target edit files.

pub mod discovery;
pub mod message;
pub mod targets;

pub use discovery::{test_file_of, unique_test_files, TestDiscovery, TestIdFiles};
pub use message::{MessageBuilder, MessageSubject, PromptTemplate};
pub use targets::{StubMarker, StubScan, TargetFiles};

use std::path::Path;

/// Lint command for a repository, or the empty string when lint feedback is off.
/// The pre-commit config is expected at the repository root.
pub fn lint_command(repo_path: &Path, use_lint_info: bool) -> String {
    if !use_lint_info {
        return String::new();
    }
    let cfg = repo_path.join(".pre-commit-config.yaml");
    format!(
        "pre-commit run --config {} --files",
        crate::util::shell_escape(&cfg.to_string_lossy())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lint_command_off_is_empty() {
        assert_eq!(lint_command(Path::new("/r/minitorch"), false), "");
    }

    #[test]
    fn test_lint_command_points_at_repo_config() {
        assert_eq!(
            lint_command(Path::new("/r/minitorch"), true),
            "pre-commit run --config /r/minitorch/.pre-commit-config.yaml --files"
        );
        let spaced = lint_command(Path::new("/r/with space"), true);
        assert!(spaced.contains("'/r/with space/.pre-commit-config.yaml'"));
    }
}
