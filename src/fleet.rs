//! Fleet-wide dispatch: select repositories from the dataset, run each on a bounded pool of
//! worker threads, report progress as they finish and persist the fleet report.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::time::Instant;

use anyhow::Result;

use crate::agent::{create_agent, resolve_agent_binary, CodingAgent};
use crate::collab::{PromptTemplate, StubScan, TestIdFiles};
use crate::color::{color_enabled_stderr, log_info_stderr, log_warn_stderr, StdoutMute};
use crate::config::{RunConfig, WorkspaceConfig};
use crate::dataset::{filter_targets, DatasetSource, JsonDataset, RepositoryTarget};
use crate::errors::config_error;
use crate::invoker::{Sleeper, ThreadSleeper};
use crate::repo_run::{Collaborators, RepositoryOrchestrator};
use crate::report::{ErrorRecord, FleetReport, RepoOutcome, RepoStatus};

pub const FLEET_REPORT_FILE: &str = "fleet_report.json";

/// Load the dataset and keep the repositories the workspace selects. An empty selection is a
/// configuration error.
pub fn select_targets(
    source: &dyn DatasetSource,
    workspace: &WorkspaceConfig,
) -> Result<Vec<RepositoryTarget>> {
    let records = source.load()?;
    let total = records.len();
    let selected = filter_targets(records, &workspace.repo_split, &workspace.splits);
    tracing::info!(
        split = %workspace.repo_split,
        total,
        selected = selected.len(),
        "selected repositories"
    );
    if selected.is_empty() {
        return Err(config_error(format!(
            "repo_split '{}' selects no repositories from {}",
            workspace.repo_split,
            workspace.dataset_name.display()
        )));
    }
    Ok(selected)
}

pub fn report_path(workspace: &WorkspaceConfig, run_id: &str) -> PathBuf {
    workspace.log_dir.join(run_id).join(FLEET_REPORT_FILE)
}

pub struct FleetOrchestrator<'a> {
    workspace: &'a WorkspaceConfig,
    collab: Collaborators<'a>,
    agent: &'a dyn CodingAgent,
    sleeper: &'a dyn Sleeper,
}

impl<'a> FleetOrchestrator<'a> {
    pub fn new(
        workspace: &'a WorkspaceConfig,
        collab: Collaborators<'a>,
        agent: &'a dyn CodingAgent,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            workspace,
            collab,
            agent,
            sleeper,
        }
    }

    /// Run every target; returns once all workers have joined. Per-repository failures end
    /// up in the report, never in the `Err` arm.
    pub fn run(&self, config: &RunConfig, targets: Vec<RepositoryTarget>) -> Result<FleetReport> {
        let run_id = config.run_id();
        let n = targets.len();
        let workers = config.concurrency.max(1).min(n.max(1));
        let use_err = color_enabled_stderr();
        let started = Instant::now();

        // Interleaved output from many repositories is unreadable; stderr progress stays.
        let _mute = StdoutMute::engage(n > 1);
        log_info_stderr(
            use_err,
            &format!("fleet-coder: running {n} repositories on branch {run_id} with {workers} workers"),
        );

        let orchestrator = RepositoryOrchestrator::new(
            &self.workspace.base_dir,
            &self.workspace.log_dir,
            self.collab,
            self.agent,
            self.sleeper,
        );
        let queue: Mutex<VecDeque<RepositoryTarget>> = Mutex::new(targets.into_iter().collect());
        let (tx, rx) = mpsc::channel::<RepoOutcome>();

        let mut outcomes = Vec::with_capacity(n);
        std::thread::scope(|s| {
            for w in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let orchestrator = &orchestrator;
                s.spawn(move || loop {
                    let next = match queue.lock() {
                        Ok(mut q) => q.pop_front(),
                        Err(poisoned) => poisoned.into_inner().pop_front(),
                    };
                    let Some(target) = next else { break };
                    tracing::debug!(worker = w, repo = %target.repo, "worker picked repository");
                    let outcome = run_isolated(orchestrator, &target, config);
                    if tx.send(outcome).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for (k, outcome) in rx.iter().enumerate() {
                let line = format!("[{}/{}] {}: {}", k + 1, n, outcome.repo, outcome.summary());
                if outcome.status == RepoStatus::Completed {
                    log_info_stderr(use_err, &line);
                } else {
                    log_warn_stderr(use_err, &line);
                }
                outcomes.push(outcome);
            }
        });

        let report = FleetReport::new(&run_id, outcomes);
        let path = report_path(self.workspace, &run_id);
        report.write_json(&path)?;
        log_info_stderr(
            use_err,
            &format!(
                "fleet-coder: {} completed, {} with unit failures, {} failed setup in {} (report: {})",
                report.completed,
                report.with_unit_failures,
                report.setup_failed,
                humantime::format_duration(std::time::Duration::from_secs(
                    started.elapsed().as_secs()
                )),
                path.display()
            ),
        );
        Ok(report)
    }
}

/// A panic inside one repository's run becomes that repository's setup failure.
fn run_isolated(
    orchestrator: &RepositoryOrchestrator<'_>,
    target: &RepositoryTarget,
    config: &RunConfig,
) -> RepoOutcome {
    match catch_unwind(AssertUnwindSafe(|| orchestrator.run(target, config))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            tracing::error!(repo = %target.repo, panic = %msg, "repository run panicked");
            RepoOutcome {
                repo: target.repo.clone(),
                repo_path: orchestrator.repo_path(target),
                branch: config.run_id(),
                status: RepoStatus::SetupFailed,
                setup_error: Some(ErrorRecord {
                    kind: "panic".to_string(),
                    message: msg,
                }),
                units: Vec::new(),
                elapsed_ms: 0,
            }
        }
    }
}

/// Full fleet run with the stock collaborators: JSON dataset, test id files, stub scan,
/// prompt template and the agent the configuration names.
pub fn run_fleet(config: &RunConfig, workspace: &WorkspaceConfig) -> Result<FleetReport> {
    config.validate()?;
    let agent = create_agent(config)?;
    let binary = resolve_agent_binary(config)?;
    tracing::info!(agent = agent.name(), binary = %binary.display(), "agent resolved");

    let dataset = JsonDataset::new(&workspace.dataset_name, workspace.dataset_split.clone());
    let targets = select_targets(&dataset, workspace)?;

    let tests = TestIdFiles::new(workspace.test_ids_dir());
    let stubs = StubScan::default();
    let prompt = PromptTemplate;
    let collab = Collaborators {
        tests: &tests,
        targets: &stubs,
        messages: &prompt,
    };
    FleetOrchestrator::new(workspace, collab, agent.as_ref(), &ThreadSleeper).run(config, targets)
}
