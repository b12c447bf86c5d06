//! fleet-coder: run a code-generating agent across a fleet of git repositories.
//!
//! Per repository the flow is branch setup (`branch`), work unit planning (`planner`),
//! then one agent call per unit with retry and per-unit logs (`invoker`, `agent`).
//! `repo_run` composes those for one repository; `fleet` fans out over many.

pub mod agent;
pub mod branch;
pub mod collab;
pub mod color;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod fleet;
pub mod git;
pub mod invoker;
pub mod lock;
pub mod planner;
pub mod repo_run;
pub mod report;
pub mod telemetry;
pub mod util;

pub use agent::{create_agent, resolve_agent_binary, AgentRequest, AiderAgent, CodingAgent, UnitLogs};
pub use branch::{ensure_branch, BranchSetup};
pub use collab::{
    lint_command, MessageBuilder, MessageSubject, PromptTemplate, StubMarker, StubScan, TargetFiles,
    TestDiscovery, TestIdFiles,
};
pub use color::{
    color_enabled_stderr, log_error_stderr, log_info_stderr,
    log_warn_stderr, out_line, set_color_mode, ColorMode, StdoutMute,
};
pub use config::{RunConfig, WorkspaceConfig};
pub use dataset::{filter_targets, DatasetSource, JsonDataset, RepositoryTarget, TestSpec};
pub use errors::{exit_code_for_error, OrchestratorError};
pub use fleet::{run_fleet, select_targets, FleetOrchestrator};
pub use invoker::{AgentInvoker, RetryPolicy, Sleeper, ThreadSleeper, UnitOutcome};
pub use planner::{PlanMode, RunPlanner, WorkUnit};
pub use repo_run::{Collaborators, RepositoryOrchestrator};
pub use report::{FleetReport, RepoOutcome, RepoStatus, UnitRecord, UnitStatus};
pub use telemetry::{telemetry_init, LogRedirect};
