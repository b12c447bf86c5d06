//! One work unit, one agent call: log isolation, bounded retry with exponential backoff.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::agent::{AgentRequest, CodingAgent, UnitLogs};
use crate::config::RunConfig;
use crate::errors::OrchestratorError;
use crate::planner::WorkUnit;
use crate::telemetry::LogRedirect;
use crate::util::exec::is_command_too_long;
use crate::util::fs::{absolutize, ensure_file_exists};

/// Attempt ceiling and delay curve. The delay before attempt `n + 1` is
/// `min(cap, base * 2^(n - 1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.backoff_base,
            cap: config.backoff_cap,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            base: crate::config::DEFAULT_BACKOFF_BASE,
            cap: crate::config::DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Waiting between attempts, swappable in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// How a work unit ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed { attempts: u32 },
    /// The OS refused to start the agent (command line too long). Not retried.
    Rejected { reason: String },
}

pub struct AgentInvoker<'a> {
    agent: &'a dyn CodingAgent,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> AgentInvoker<'a> {
    pub fn new(agent: &'a dyn CodingAgent, policy: RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            agent,
            policy,
            sleeper,
        }
    }

    /// Run `unit` in `workdir`. Every tracing event this thread emits until the call returns
    /// lands in the unit's `aider.log`; the previous destination is restored on all paths.
    pub fn invoke(&self, unit: &WorkUnit, workdir: &Path) -> Result<UnitOutcome> {
        let log_dir = absolutize(&unit.log_dir)?;
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
        let logs = UnitLogs::in_dir(&log_dir);
        ensure_file_exists(&logs.log_file)?;

        tracing::info!(
            unit = %unit.label,
            "check {} for prompts and lm generations",
            logs.chat_history.display()
        );

        let _redirect = LogRedirect::to_file(&logs.log_file)
            .with_context(|| format!("failed to redirect logs to {}", logs.log_file.display()))?;

        let request = AgentRequest {
            instruction: &unit.instruction,
            files: &unit.files,
            test_cmd: unit.test_cmd.as_deref(),
            lint_cmd: &unit.lint_cmd,
            workdir,
            logs: &logs,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            tracing::info!(
                unit = %unit.label,
                agent = self.agent.name(),
                attempt,
                max_attempts = self.policy.max_attempts,
                "invoking agent"
            );
            let err = match self.agent.run(&request) {
                Ok(()) => {
                    tracing::info!(unit = %unit.label, attempt, "agent completed");
                    return Ok(UnitOutcome::Completed { attempts: attempt });
                }
                Err(e) => e,
            };

            if is_command_too_long(&err) {
                tracing::error!(unit = %unit.label, error = %err, "agent command rejected by the OS; not retrying");
                return Ok(UnitOutcome::Rejected {
                    reason: format!("{err:#}"),
                });
            }

            if attempt >= self.policy.max_attempts {
                tracing::error!(unit = %unit.label, attempt, error = %format!("{err:#}"), "agent failed; giving up");
                return Err(anyhow::Error::new(OrchestratorError::Invocation {
                    attempts: attempt,
                    last: format!("{err:#}"),
                }));
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                unit = %unit.label,
                attempt,
                error = %format!("{err:#}"),
                retry_in = %humantime::format_duration(delay),
                "agent attempt failed"
            );
            self.sleeper.sleep(delay);
        }
    }
}
