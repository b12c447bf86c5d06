use std::path::Path;

use anyhow::Result;

use crate::config::RunConfig;

/// Test material shown to the agent only up to this many characters.
pub const MAX_TEST_CONTEXT_CHARS: usize = 10_000;

/// What an instruction is about: one test file (test-feedback mode) or the whole
/// test directory (no-test mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSubject<'a> {
    TestFile(&'a str),
    TestDir(&'a str),
}

/// Builds the natural-language instruction handed to the agent.
pub trait MessageBuilder: Send + Sync {
    fn build(&self, config: &RunConfig, repo_path: &Path, subject: MessageSubject<'_>)
        -> Result<String>;
}

/// The configured prompt followed by a pointer to the tests, plus the test file's content
/// when one is named and readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptTemplate;

impl MessageBuilder for PromptTemplate {
    fn build(
        &self,
        config: &RunConfig,
        repo_path: &Path,
        subject: MessageSubject<'_>,
    ) -> Result<String> {
        let mut msg = config.user_prompt.trim_end().to_string();
        msg.push_str("\n\n");
        match subject {
            MessageSubject::TestFile(test_file) => {
                msg.push_str(&format!(
                    "Your implementation will be checked against the unit tests in {test_file}.\n"
                ));
                if let Ok(body) = std::fs::read_to_string(repo_path.join(test_file)) {
                    msg.push_str("\nHere are the unit tests:\n```python\n");
                    msg.push_str(&truncate_chars(&body, MAX_TEST_CONTEXT_CHARS));
                    msg.push_str("\n```\n");
                }
            }
            MessageSubject::TestDir(test_dir) => {
                msg.push_str(&format!(
                    "The unit tests for this repository live under {test_dir}.\n"
                ));
            }
        }
        Ok(msg)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n# ... truncated", &s[..idx]),
        None => s.to_string(),
    }
}
