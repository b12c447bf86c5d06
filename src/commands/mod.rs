use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

use fleet_coder::errors::{config_error, error_kind_label, exit_code_for_error};
use fleet_coder::{
    color_enabled_stderr, create_agent, log_error_stderr, log_info_stderr, out_line, run_fleet,
    select_targets, Collaborators, JsonDataset, PromptTemplate, RepositoryOrchestrator, RunConfig,
    StubScan, TestIdFiles, ThreadSleeper, WorkspaceConfig,
};

use crate::cli::ConfigArgs;

fn report_failure(e: &anyhow::Error) -> ExitCode {
    let use_err = color_enabled_stderr();
    log_error_stderr(
        use_err,
        &format!("fleet-coder: {} error: {e:#}", error_kind_label(e)),
    );
    ExitCode::from(exit_code_for_error(e))
}

fn load_configs(args: &ConfigArgs) -> Result<(RunConfig, WorkspaceConfig)> {
    let config = RunConfig::load(&args.config)?;
    config.validate()?;
    let workspace = WorkspaceConfig::load(&args.workspace)?;
    Ok((config, workspace))
}

pub fn run_fleet_cmd(args: &ConfigArgs) -> ExitCode {
    let result = load_configs(args).and_then(|(config, workspace)| run_fleet(&config, &workspace));
    match result {
        Ok(report) => {
            let failed = report.failed_repos();
            if !failed.is_empty() {
                // Per-repository failures are reported, not fatal.
                out_line(&format!("repositories with failures: {}", failed.join(", ")));
            }
            ExitCode::from(0)
        }
        Err(e) => report_failure(&e),
    }
}

pub fn run_plan(args: &ConfigArgs, repo: Option<&str>) -> ExitCode {
    match plan_inner(args, repo) {
        Ok(()) => ExitCode::from(0),
        Err(e) => report_failure(&e),
    }
}

fn plan_inner(args: &ConfigArgs, repo: Option<&str>) -> Result<()> {
    let (config, workspace) = load_configs(args)?;
    let dataset = JsonDataset::new(&workspace.dataset_name, workspace.dataset_split.clone());
    let mut targets = select_targets(&dataset, &workspace)?;
    if let Some(name) = repo {
        targets.retain(|t| t.short_name() == name || t.dir_name() == name || t.repo == name);
        if targets.is_empty() {
            return Err(config_error(format!(
                "repository '{name}' is not part of split '{}'",
                workspace.repo_split
            )));
        }
    }

    let agent = create_agent(&config)?;
    let tests = TestIdFiles::new(workspace.test_ids_dir());
    let stubs = StubScan::default();
    let prompt = PromptTemplate;
    let orchestrator = RepositoryOrchestrator::new(
        &workspace.base_dir,
        &workspace.log_dir,
        Collaborators {
            tests: &tests,
            targets: &stubs,
            messages: &prompt,
        },
        agent.as_ref(),
        &ThreadSleeper,
    );

    let use_err = color_enabled_stderr();
    log_info_stderr(use_err, &format!("fleet-coder: branch {}", config.run_id()));
    for target in &targets {
        match orchestrator.preview(target, &config) {
            Ok(units) => {
                out_line(&format!("{} ({} units)", target.repo, units.len()));
                for unit in units {
                    out_line(&format!("  {} -> {}", unit.label, unit.log_dir.display()));
                    out_line(&format!("    files: {}", unit.files.join(" ")));
                    if let Some(test_cmd) = &unit.test_cmd {
                        out_line(&format!("    test:  {test_cmd}"));
                    }
                    if !unit.lint_cmd.is_empty() {
                        out_line(&format!("    lint:  {}", unit.lint_cmd));
                    }
                }
            }
            Err(e) => {
                log_error_stderr(use_err, &format!("{}: cannot plan: {e:#}", target.repo));
            }
        }
    }
    Ok(())
}

pub fn run_run_id(config: &Path) -> ExitCode {
    match RunConfig::load(config) {
        Ok(cfg) => {
            out_line(&cfg.run_id());
            ExitCode::from(0)
        }
        Err(e) => report_failure(&e),
    }
}
