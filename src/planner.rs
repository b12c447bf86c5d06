//! Turns one repository plus a run configuration into the ordered work units the agent
//! will execute.
//!
//! With test feedback there is one unit per test file (sorted, de-duplicated, selector
//! suffix dropped), each editing all target files. Without it there is one unit per target
//! file. Units are built lazily as the caller pulls them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::collab::{lint_command, unique_test_files, MessageBuilder, MessageSubject};
use crate::config::RunConfig;
use crate::dataset::RepositoryTarget;
use crate::util::flatten_file_name;

pub const WITH_TESTS_DIR: &str = "with_tests";
pub const NO_TESTS_DIR: &str = "no_tests";
pub const CONFIG_SNAPSHOT_FILE: &str = ".agent.yaml";

/// One agent invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Test file or target file this unit was derived from.
    pub label: String,
    pub instruction: String,
    pub files: Vec<String>,
    pub test_cmd: Option<String>,
    /// Empty when lint feedback is off.
    pub lint_cmd: String,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    WithTests,
    NoTests,
}

impl PlanMode {
    pub fn for_config(config: &RunConfig) -> Self {
        if config.run_tests {
            PlanMode::WithTests
        } else {
            PlanMode::NoTests
        }
    }

    fn dir_name(self) -> &'static str {
        match self {
            PlanMode::WithTests => WITH_TESTS_DIR,
            PlanMode::NoTests => NO_TESTS_DIR,
        }
    }
}

/// Resolved facts about one repository that planning needs.
#[derive(Debug, Clone)]
pub struct RepoContext<'a> {
    pub target: &'a RepositoryTarget,
    pub repo_path: &'a Path,
    pub test_ids: &'a [String],
    pub target_files: &'a [String],
}

/// `<log_root>/<repo dir name>/<run id>`: everything one repository writes for one run.
pub fn repo_log_root(log_root: &Path, target: &RepositoryTarget, run_id: &str) -> PathBuf {
    log_root.join(target.dir_name()).join(run_id)
}

pub struct RunPlanner<'a> {
    messages: &'a dyn MessageBuilder,
    log_root: PathBuf,
    persist_config: bool,
}

impl<'a> RunPlanner<'a> {
    pub fn new(messages: &'a dyn MessageBuilder, log_root: impl Into<PathBuf>) -> Self {
        Self {
            messages,
            log_root: log_root.into(),
            persist_config: true,
        }
    }

    /// Skip writing the configuration snapshot (dry runs).
    pub fn persist_config(mut self, yes: bool) -> Self {
        self.persist_config = yes;
        self
    }

    pub fn plan<'c>(&self, ctx: &RepoContext<'_>, config: &'c RunConfig) -> Result<WorkUnits<'c>>
    where
        'a: 'c,
    {
        let mode = PlanMode::for_config(config);
        let run_id = config.run_id();
        let mode_root = repo_log_root(&self.log_root, ctx.target, &run_id).join(mode.dir_name());
        let lint_cmd = lint_command(ctx.repo_path, config.use_lint_info);

        let (queue, shared_instruction) = match mode {
            PlanMode::WithTests => (unique_test_files(ctx.test_ids), None),
            PlanMode::NoTests => {
                let mut files = ctx.target_files.to_vec();
                files.sort();
                files.dedup();
                let instruction = self
                    .messages
                    .build(
                        config,
                        ctx.repo_path,
                        MessageSubject::TestDir(&ctx.target.test.test_dir),
                    )
                    .context("failed to build repository instruction")?;
                if self.persist_config {
                    write_config_snapshot(&mode_root, config)?;
                }
                (files, Some(instruction))
            }
        };

        tracing::debug!(
            repo = %ctx.target.repo,
            mode = mode.dir_name(),
            units = queue.len(),
            "planned work units"
        );

        Ok(WorkUnits {
            mode,
            queue: queue.into_iter(),
            messages: self.messages,
            config,
            repo_path: ctx.repo_path.to_path_buf(),
            repo_name: ctx.target.dir_name(),
            run_id,
            mode_root,
            lint_cmd,
            target_files: ctx.target_files.to_vec(),
            shared_instruction,
        })
    }
}

fn write_config_snapshot(mode_root: &Path, config: &RunConfig) -> Result<()> {
    std::fs::create_dir_all(mode_root)
        .with_context(|| format!("failed to create {}", mode_root.display()))?;
    let path = mode_root.join(CONFIG_SNAPSHOT_FILE);
    std::fs::write(&path, config.to_yaml()?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote run configuration snapshot");
    Ok(())
}

/// Fill `{repo_path}`, `{repo_name}`, `{test_file}`, `{run_id}` in a test command template.
pub fn render_test_cmd(
    template: &str,
    repo_path: &Path,
    repo_name: &str,
    test_file: &str,
    run_id: &str,
) -> String {
    template
        .replace("{repo_path}", &repo_path.to_string_lossy())
        .replace("{repo_name}", repo_name)
        .replace("{test_file}", test_file)
        .replace("{run_id}", run_id)
}

/// Lazy, single-pass sequence of work units for one repository.
pub struct WorkUnits<'c> {
    mode: PlanMode,
    queue: std::vec::IntoIter<String>,
    messages: &'c dyn MessageBuilder,
    config: &'c RunConfig,
    repo_path: PathBuf,
    repo_name: String,
    run_id: String,
    mode_root: PathBuf,
    lint_cmd: String,
    target_files: Vec<String>,
    shared_instruction: Option<String>,
}

impl WorkUnits<'_> {
    pub fn mode(&self) -> PlanMode {
        self.mode
    }

    fn unit_for(&self, file: String) -> Result<WorkUnit> {
        let log_dir = self.mode_root.join(flatten_file_name(&file));
        match self.mode {
            PlanMode::WithTests => {
                let instruction = self
                    .messages
                    .build(self.config, &self.repo_path, MessageSubject::TestFile(&file))
                    .with_context(|| format!("failed to build instruction for {file}"))?;
                let test_cmd = render_test_cmd(
                    &self.config.test_cmd_template,
                    &self.repo_path,
                    &self.repo_name,
                    &file,
                    &self.run_id,
                );
                Ok(WorkUnit {
                    label: file,
                    instruction,
                    files: self.target_files.clone(),
                    test_cmd: Some(test_cmd),
                    lint_cmd: self.lint_cmd.clone(),
                    log_dir,
                })
            }
            PlanMode::NoTests => Ok(WorkUnit {
                instruction: self.shared_instruction.clone().unwrap_or_default(),
                files: vec![file.clone()],
                label: file,
                test_cmd: None,
                lint_cmd: self.lint_cmd.clone(),
                log_dir,
            }),
        }
    }
}

impl Iterator for WorkUnits<'_> {
    type Item = Result<WorkUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.queue.next()?;
        Some(self.unit_for(file))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.queue.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::PromptTemplate;
    use crate::dataset::TestSpec;

    fn target() -> RepositoryTarget {
        RepositoryTarget {
            repo: "commit0/Simpy".to_string(),
            base_commit: "abc".to_string(),
            test: TestSpec {
                test_dir: "tests/".to_string(),
            },
            split: None,
        }
    }

    #[test]
    fn test_render_test_cmd() {
        let cmd = render_test_cmd(
            crate::config::DEFAULT_TEST_CMD_TEMPLATE,
            Path::new("/r/simpy"),
            "simpy",
            "tests/test_a.py",
            "aider-m-iter1-tests-nolint",
        );
        assert_eq!(
            cmd,
            "python -m commit0 test /r/simpy tests/test_a.py --branch aider-m-iter1-tests-nolint"
        );
    }

    #[test]
    fn test_with_tests_mode_one_unit_per_test_file() {
        let td = tempfile::tempdir().expect("tmpdir");
        let mut cfg = RunConfig::new("aider", "m", 2);
        cfg.run_tests = true;
        cfg.use_lint_info = true;
        let t = target();
        let ids: Vec<String> = ["tests/test_b.py::x", "tests/test_a.py::y", "tests/test_b.py::z"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let files = vec!["simpy/core.py".to_string(), "simpy/util.py".to_string()];
        let ctx = RepoContext {
            target: &t,
            repo_path: Path::new("/r/simpy"),
            test_ids: &ids,
            target_files: &files,
        };
        let builder = PromptTemplate;
        let planner = RunPlanner::new(&builder, td.path());
        let units = planner.plan(&ctx, &cfg).expect("plan");
        assert_eq!(units.mode(), PlanMode::WithTests);
        let units: Vec<WorkUnit> = units.collect::<Result<_>>().expect("units");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].label, "tests/test_a.py");
        assert_eq!(units[1].label, "tests/test_b.py");
        assert_eq!(units[0].files, files);
        assert!(units[0].test_cmd.as_deref().unwrap().contains("tests/test_a.py"));
        assert!(units[0].lint_cmd.starts_with("pre-commit run"));
        assert_eq!(
            units[0].log_dir,
            td.path()
                .join("simpy")
                .join(cfg.run_id())
                .join("with_tests")
                .join("tests__test_a")
        );
        // test-feedback mode writes no snapshot
        assert!(!td.path().join("simpy").join(cfg.run_id()).join("no_tests").exists());
    }

    #[test]
    fn test_no_tests_mode_writes_snapshot_and_splits_files() {
        let td = tempfile::tempdir().expect("tmpdir");
        let cfg = RunConfig::new("aider", "m", 1);
        let t = target();
        let files = vec!["simpy/core.py".to_string(), "simpy/util.py".to_string()];
        let ctx = RepoContext {
            target: &t,
            repo_path: Path::new("/r/simpy"),
            test_ids: &[],
            target_files: &files,
        };
        let builder = PromptTemplate;
        let units: Vec<WorkUnit> = RunPlanner::new(&builder, td.path())
            .plan(&ctx, &cfg)
            .expect("plan")
            .collect::<Result<_>>()
            .expect("units");
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].files, vec!["simpy/util.py".to_string()]);
        assert!(units.iter().all(|u| u.test_cmd.is_none() && u.lint_cmd.is_empty()));
        assert_eq!(units[0].instruction, units[1].instruction);
        assert!(units[0].instruction.contains("tests/"));

        let snap = td
            .path()
            .join("simpy")
            .join(cfg.run_id())
            .join("no_tests")
            .join(CONFIG_SNAPSHOT_FILE);
        let back: RunConfig =
            serde_yaml::from_str(&std::fs::read_to_string(snap).expect("snapshot")).expect("yaml");
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_empty_inputs_yield_empty_sequence() {
        let td = tempfile::tempdir().expect("tmpdir");
        let t = target();
        let builder = PromptTemplate;
        let planner = RunPlanner::new(&builder, td.path());
        let ctx = RepoContext {
            target: &t,
            repo_path: Path::new("/r/simpy"),
            test_ids: &[],
            target_files: &[],
        };
        let mut with_tests = RunConfig::new("aider", "m", 1);
        with_tests.run_tests = true;
        assert_eq!(planner.plan(&ctx, &with_tests).expect("plan").count(), 0);
        let no_tests = RunConfig::new("aider", "m", 1);
        assert_eq!(planner.plan(&ctx, &no_tests).expect("plan").count(), 0);
    }

    #[test]
    fn test_no_tests_mode_drops_scattered_duplicates() {
        let td = tempfile::tempdir().expect("tmpdir");
        let t = target();
        let files: Vec<String> = ["simpy/util.py", "simpy/core.py", "simpy/util.py"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let ctx = RepoContext {
            target: &t,
            repo_path: Path::new("/r/simpy"),
            test_ids: &[],
            target_files: &files,
        };
        let builder = PromptTemplate;
        let cfg = RunConfig::new("aider", "m", 1);
        let labels: Vec<String> = RunPlanner::new(&builder, td.path())
            .plan(&ctx, &cfg)
            .expect("plan")
            .map(|u| u.map(|u| u.label))
            .collect::<Result<_>>()
            .expect("units");
        assert_eq!(labels, vec!["simpy/core.py", "simpy/util.py"]);
    }

    #[test]
    fn test_no_tests_snapshot_written_even_without_targets() {
        let td = tempfile::tempdir().expect("tmpdir");
        let t = target();
        let ctx = RepoContext {
            target: &t,
            repo_path: Path::new("/r/simpy"),
            test_ids: &[],
            target_files: &[],
        };
        let builder = PromptTemplate;
        let cfg = RunConfig::new("aider", "m", 1);
        let n = RunPlanner::new(&builder, td.path())
            .plan(&ctx, &cfg)
            .expect("plan")
            .count();
        assert_eq!(n, 0);
        assert!(td
            .path()
            .join("simpy")
            .join(cfg.run_id())
            .join(NO_TESTS_DIR)
            .join(CONFIG_SNAPSHOT_FILE)
            .is_file());
    }

    #[test]
    fn test_dry_run_skips_snapshot() {
        let td = tempfile::tempdir().expect("tmpdir");
        let t = target();
        let files = vec!["simpy/core.py".to_string()];
        let ctx = RepoContext {
            target: &t,
            repo_path: Path::new("/r/simpy"),
            test_ids: &[],
            target_files: &files,
        };
        let builder = PromptTemplate;
        let cfg = RunConfig::new("aider", "m", 1);
        let n = RunPlanner::new(&builder, td.path())
            .persist_config(false)
            .plan(&ctx, &cfg)
            .expect("plan")
            .count();
        assert_eq!(n, 1);
        assert!(std::fs::read_dir(td.path()).expect("read").next().is_none());
    }
}
