//! Everything that happens to one repository during a fleet run: lock, test discovery,
//! branch setup, planning, then the work units in order.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::agent::CodingAgent;
use crate::branch::ensure_branch;
use crate::color::out_line;
use crate::collab::{MessageBuilder, TargetFiles, TestDiscovery};
use crate::config::RunConfig;
use crate::dataset::RepositoryTarget;
use crate::errors::error_kind_label;
use crate::invoker::{AgentInvoker, RetryPolicy, Sleeper, UnitOutcome};
use crate::lock::{acquire_repo_lock, should_acquire_lock, RepoLock};
use crate::planner::{RepoContext, RunPlanner, WorkUnit};
use crate::report::{ErrorRecord, RepoOutcome, RepoStatus, UnitRecord, UnitStatus};

/// The collaborators a repository run consults.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub tests: &'a dyn TestDiscovery,
    pub targets: &'a dyn TargetFiles,
    pub messages: &'a dyn MessageBuilder,
}

pub struct RepositoryOrchestrator<'a> {
    base_dir: PathBuf,
    log_root: PathBuf,
    collab: Collaborators<'a>,
    agent: &'a dyn CodingAgent,
    sleeper: &'a dyn Sleeper,
}

/// Output of a successful setup phase.
struct Prepared<'c> {
    _lock: Option<RepoLock>,
    units: crate::planner::WorkUnits<'c>,
}

impl<'a> RepositoryOrchestrator<'a> {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        log_root: impl Into<PathBuf>,
        collab: Collaborators<'a>,
        agent: &'a dyn CodingAgent,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            log_root: log_root.into(),
            collab,
            agent,
            sleeper,
        }
    }

    /// Process one repository. Never fails: setup errors and unit failures are recorded in
    /// the returned outcome so sibling repositories are unaffected.
    pub fn run(&self, target: &RepositoryTarget, config: &RunConfig) -> RepoOutcome {
        let started = Instant::now();
        let repo_path = self.repo_path(target);
        let run_id = config.run_id();
        let _span = tracing::info_span!("repo", repo = %target.repo).entered();
        out_line(&format!("{}: {} on branch {}", target.repo, repo_path.display(), run_id));

        let mut outcome = RepoOutcome {
            repo: target.repo.clone(),
            repo_path: repo_path.clone(),
            branch: run_id.clone(),
            status: RepoStatus::Completed,
            setup_error: None,
            units: Vec::new(),
            elapsed_ms: 0,
        };

        match self.prepare(target, config, &repo_path, &run_id) {
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), kind = error_kind_label(&e), "repository setup failed");
                outcome.status = RepoStatus::SetupFailed;
                outcome.setup_error = Some(ErrorRecord::from_error(&e));
            }
            Ok(prepared) => {
                let invoker =
                    AgentInvoker::new(self.agent, RetryPolicy::from_config(config), self.sleeper);
                for unit in prepared.units {
                    let record = match unit {
                        Ok(unit) => self.run_unit(&invoker, &unit, &repo_path),
                        Err(e) => UnitRecord {
                            label: "(unplanned)".to_string(),
                            log_dir: PathBuf::new(),
                            status: UnitStatus::Failed,
                            attempts: None,
                            error: Some(format!("{e:#}")),
                        },
                    };
                    outcome.units.push(record);
                }
                if outcome.units.iter().any(|u| u.status != UnitStatus::Completed) {
                    outcome.status = RepoStatus::UnitFailures;
                }
            }
        }

        outcome.elapsed_ms = started.elapsed().as_millis();
        tracing::info!(status = ?outcome.status, units = outcome.units.len(), "repository finished");
        outcome
    }

    /// Work units a run would execute against the checkout as it is now. Takes no lock,
    /// touches no branch and writes nothing.
    pub fn preview(&self, target: &RepositoryTarget, config: &RunConfig) -> Result<Vec<WorkUnit>> {
        let repo_path = self.repo_path(target);
        let test_ids = self.collab.tests.test_ids(&target.dir_name())?;
        let target_files = self
            .collab
            .targets
            .target_files(&repo_path, &target.test.test_dir)?;
        let ctx = RepoContext {
            target,
            repo_path: &repo_path,
            test_ids: &test_ids,
            target_files: &target_files,
        };
        RunPlanner::new(self.collab.messages, &self.log_root)
            .persist_config(false)
            .plan(&ctx, config)?
            .collect()
    }

    pub fn repo_path(&self, target: &RepositoryTarget) -> PathBuf {
        target.repo_path(&self.base_dir)
    }

    fn prepare<'c>(
        &self,
        target: &RepositoryTarget,
        config: &'c RunConfig,
        repo_path: &Path,
        run_id: &str,
    ) -> Result<Prepared<'c>>
    where
        'a: 'c,
    {
        let lock = if should_acquire_lock() && repo_path.exists() {
            let lock = acquire_repo_lock(repo_path)?;
            tracing::debug!(path = %lock.path().display(), "repository lock acquired");
            Some(lock)
        } else {
            None
        };

        let test_ids = self
            .collab
            .tests
            .test_ids(&target.dir_name())
            .with_context(|| format!("test discovery failed for {}", target.repo))?;

        tracing::info!(branch = run_id, "agent is coding on branch");
        ensure_branch(repo_path, run_id, &target.base_commit)?;

        let target_files = self
            .collab
            .targets
            .target_files(repo_path, &target.test.test_dir)
            .with_context(|| format!("failed to resolve target edit files in {}", repo_path.display()))?;

        let ctx = RepoContext {
            target,
            repo_path,
            test_ids: &test_ids,
            target_files: &target_files,
        };
        let units = RunPlanner::new(self.collab.messages, &self.log_root).plan(&ctx, config)?;
        Ok(Prepared { _lock: lock, units })
    }

    fn run_unit(&self, invoker: &AgentInvoker<'_>, unit: &WorkUnit, workdir: &Path) -> UnitRecord {
        let (status, attempts, error) = match invoker.invoke(unit, workdir) {
            Ok(UnitOutcome::Completed { attempts }) => (UnitStatus::Completed, Some(attempts), None),
            Ok(UnitOutcome::Rejected { reason }) => (UnitStatus::Rejected, Some(1), Some(reason)),
            Err(e) => {
                tracing::error!(unit = %unit.label, error = %format!("{e:#}"), "work unit failed; continuing with the next one");
                let attempts = match e.downcast_ref::<crate::errors::OrchestratorError>() {
                    Some(crate::errors::OrchestratorError::Invocation { attempts, .. }) => {
                        Some(*attempts)
                    }
                    _ => None,
                };
                (UnitStatus::Failed, attempts, Some(format!("{e:#}")))
            }
        };
        UnitRecord {
            label: unit.label.clone(),
            log_dir: unit.log_dir.clone(),
            status,
            attempts,
            error,
        }
    }
}
