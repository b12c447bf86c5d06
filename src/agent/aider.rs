use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::json;

use super::{AgentRequest, CodingAgent};
use crate::config::RunConfig;
use crate::util::exec::{is_command_too_long, ExecRequest, ExecService};
use crate::util::shell_join;

/// Builds aider's `Coder` in-process, caps its reflection rounds and sends one message.
/// Takes a single JSON argument describing the call.
pub const DRIVER: &str = include_str!("aider_driver.py");

/// Aider driven through its Python API in a child interpreter, so the reflection cap can be
/// set on the coder itself.
#[derive(Debug, Clone)]
pub struct AiderAgent {
    python: String,
    model: String,
    max_iteration: u32,
    exec: ExecService,
}

impl AiderAgent {
    pub fn new(python: &str, model: &str, max_iteration: u32, timeout: Option<Duration>) -> Self {
        Self {
            python: python.to_string(),
            model: model.to_string(),
            max_iteration,
            exec: ExecService::new(timeout.unwrap_or(Duration::ZERO)),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            &config.agent_binary,
            &config.model_name,
            config.max_iteration,
            config.agent_timeout,
        )
    }

    /// The driver's argument for one attempt.
    pub fn call_spec(&self, req: &AgentRequest<'_>) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_reflections": self.max_iteration,
            "files": req.files,
            "auto_test": req.auto_test(),
            "test_cmd": req.test_cmd.filter(|_| req.auto_test()).map(str::trim),
            "auto_lint": req.auto_lint(),
            "lint_cmd": req.lint_cmd.trim(),
            "input_history_file": req.logs.input_history,
            "chat_history_file": req.logs.chat_history,
            "message": req.instruction,
        })
    }

    /// Command line for one attempt. Output goes to the unit's log file; the chat transcript
    /// and input history go to their own files next to it.
    pub fn command_for(&self, req: &AgentRequest<'_>) -> ExecRequest {
        ExecRequest::new(&self.python)
            .arg("-c")
            .arg(DRIVER)
            .arg(self.call_spec(req).to_string())
            .cwd(req.workdir)
            .output_file(&req.logs.log_file)
    }
}

impl CodingAgent for AiderAgent {
    fn name(&self) -> &str {
        "aider"
    }

    fn run(&self, req: &AgentRequest<'_>) -> Result<()> {
        let cmd = self.command_for(req);
        tracing::info!(
            model = %self.model,
            files = req.files.len(),
            auto_test = req.auto_test(),
            auto_lint = req.auto_lint(),
            "starting aider"
        );
        let out = match self.exec.run(cmd.clone()) {
            Ok(o) => o,
            Err(e) => {
                if is_command_too_long(&e) {
                    tracing::error!(command = %shell_join(&cmd.argv_lossy()), "command failed due to the command line being too long");
                }
                return Err(e);
            }
        };
        if out.status.success() {
            tracing::info!(elapsed = ?out.duration, "aider finished");
            Ok(())
        } else {
            Err(anyhow!(
                "aider exited with {} after {:?}",
                out.status
                    .code()
                    .map(|c| format!("status {c}"))
                    .unwrap_or_else(|| "a signal".to_string()),
                out.duration
            ))
        }
    }
}
