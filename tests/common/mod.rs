#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};

use fleet_coder::{
    AgentRequest, CodingAgent, RepositoryTarget, Sleeper, TargetFiles, TestDiscovery, TestSpec,
};

pub fn have_git() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn git(repo: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Fresh repository with one commit; returns that commit's sha.
pub fn init_repo(repo: &Path) -> String {
    std::fs::create_dir_all(repo).expect("mkdir repo");
    git(repo, &["init"]);
    git(repo, &["config", "user.name", "Fleet Test"]);
    git(repo, &["config", "user.email", "fleet@example.com"]);
    git(repo, &["config", "commit.gpgsign", "false"]);
    commit_file(repo, "README.md", "hello\n", "init")
}

pub fn commit_file(repo: &Path, name: &str, content: &str, msg: &str) -> String {
    let p = repo.join(name);
    if let Some(parent) = p.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(&p, content).expect("write");
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-m", msg]);
    head(repo)
}

pub fn head(repo: &Path) -> String {
    git(repo, &["rev-parse", "HEAD"])
}

pub fn target(repo: &str, base_commit: &str) -> RepositoryTarget {
    RepositoryTarget {
        repo: repo.to_string(),
        base_commit: base_commit.to_string(),
        test: TestSpec {
            test_dir: "tests/".to_string(),
        },
        split: None,
    }
}

/// What the fake agent does on a given call.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(&'static str),
    TooLong,
    Panic,
}

/// Everything an agent call received, plus where this thread's logs went at the time.
#[derive(Debug, Clone)]
pub struct Call {
    pub instruction: String,
    pub files: Vec<String>,
    pub test_cmd: Option<String>,
    pub lint_cmd: String,
    pub workdir: PathBuf,
    pub log_file: PathBuf,
    pub redirected_to: Option<PathBuf>,
}

/// Plays back `steps` in order, then succeeds.
pub struct FakeAgent {
    steps: Mutex<Vec<Step>>,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeAgent {
    pub fn new(steps: Vec<Step>) -> Self {
        let mut steps = steps;
        steps.reverse();
        Self {
            steps: Mutex::new(steps),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls").clone()
    }
}

impl CodingAgent for FakeAgent {
    fn name(&self) -> &str {
        "fake"
    }

    fn run(&self, req: &AgentRequest<'_>) -> Result<()> {
        tracing::info!(files = req.files.len(), "fake agent called");
        self.calls.lock().expect("calls").push(Call {
            instruction: req.instruction.to_string(),
            files: req.files.to_vec(),
            test_cmd: req.test_cmd.map(str::to_string),
            lint_cmd: req.lint_cmd.to_string(),
            workdir: req.workdir.to_path_buf(),
            log_file: req.logs.log_file.clone(),
            redirected_to: fleet_coder::telemetry::current_log_path(),
        });
        let step = self.steps.lock().expect("steps").pop().unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => Ok(()),
            Step::Fail(msg) => Err(anyhow!(msg)),
            Step::TooLong => Err(anyhow::Error::new(io::Error::from_raw_os_error(7))
                .context("failed to spawn fake agent")),
            Step::Panic => panic!("fake agent blew up"),
        }
    }
}

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().expect("delays").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, d: Duration) {
        self.delays.lock().expect("delays").push(d);
    }
}

/// Test ids keyed by repository directory name; unknown repositories fail.
#[derive(Default)]
pub struct StaticTests(pub HashMap<String, Vec<String>>);

impl StaticTests {
    pub fn with(repo: &str, ids: &[&str]) -> Self {
        let mut m = HashMap::new();
        m.insert(repo.to_string(), ids.iter().map(|s| s.to_string()).collect());
        Self(m)
    }

    pub fn and(mut self, repo: &str, ids: &[&str]) -> Self {
        self.0
            .insert(repo.to_string(), ids.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl TestDiscovery for StaticTests {
    fn test_ids(&self, repo_name: &str) -> Result<Vec<String>> {
        self.0
            .get(repo_name)
            .cloned()
            .ok_or_else(|| anyhow!("no test ids for {repo_name}"))
    }
}

pub struct StaticTargets(pub Vec<String>);

impl StaticTargets {
    pub fn of(files: &[&str]) -> Self {
        Self(files.iter().map(|s| s.to_string()).collect())
    }
}

impl TargetFiles for StaticTargets {
    fn target_files(&self, _repo_path: &Path, _test_dir: &str) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}
