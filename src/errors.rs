//! Error mapping guide:
//! - Config errors are fatal at startup and map to exit code 2.
//! - Map io::ErrorKind::NotFound to exit code 127; all others to 1.
//! - RepositoryState and Invocation errors never reach the exit code; the fleet
//!   records them per repository.
use std::fmt;
use std::io;

/// Failure taxonomy for orchestration. Carried inside `anyhow::Error` and recovered
/// with `downcast_ref` where the category matters.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Missing config file, unimplemented agent variant, empty dataset selection.
    Config(String),
    /// Not a git work tree, branch tip mismatch after reset.
    RepositoryState(String),
    /// Agent failed on every allowed attempt.
    Invocation { attempts: u32, last: String },
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Config(s) => write!(f, "configuration error: {s}"),
            OrchestratorError::RepositoryState(s) => write!(f, "repository state error: {s}"),
            OrchestratorError::Invocation { attempts, last } => {
                write!(f, "agent invocation failed after {attempts} attempt(s): {last}")
            }
            OrchestratorError::Io(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrchestratorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        OrchestratorError::Io(e)
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

pub fn exit_code_for_error(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::Config(_)) => 2,
        Some(OrchestratorError::Io(ioe)) => exit_code_for_io_error(ioe),
        Some(_) => 1,
        None => e
            .downcast_ref::<io::Error>()
            .map(exit_code_for_io_error)
            .unwrap_or(1),
    }
}

/// Short category label used in reports and progress lines.
pub fn error_kind_label(e: &anyhow::Error) -> &'static str {
    match e.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::Config(_)) => "config",
        Some(OrchestratorError::RepositoryState(_)) => "repository-state",
        Some(OrchestratorError::Invocation { .. }) => "invocation",
        Some(OrchestratorError::Io(_)) => "io",
        None => "other",
    }
}

pub fn config_error(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(OrchestratorError::Config(msg.into()))
}

pub fn repo_state_error(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(OrchestratorError::RepositoryState(msg.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_category() {
        assert_eq!(exit_code_for_error(&config_error("empty selection")), 2);
        assert_eq!(exit_code_for_error(&repo_state_error("not a repo")), 1);
        let nf = anyhow::Error::new(io::Error::new(io::ErrorKind::NotFound, "aider"));
        assert_eq!(exit_code_for_error(&nf), 127);
    }

    #[test]
    fn test_kind_label_survives_context() {
        let e = repo_state_error("tip mismatch").context("setting up branch");
        assert_eq!(error_kind_label(&e), "repository-state");
        assert_eq!(error_kind_label(&anyhow::anyhow!("plain")), "other");
    }
}
