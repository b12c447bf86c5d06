use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "fleet-coder",
    version,
    about = "Run a coding agent (Aider) across a fleet of git repositories, one branch per run configuration.",
    after_long_help = "Examples:\n  fleet-coder run --config agent.yaml\n  fleet-coder plan --config agent.yaml --repo simpy\n  fleet-coder run-id --config agent.yaml\n\n",
    after_help = "\n"
)]
pub(crate) struct Cli {
    /// Print detailed execution info (debug-level logs unless FLEET_CODER_LOG is set)
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<fleet_coder::ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct ConfigArgs {
    /// Run configuration (agent, model, feedback switches)
    #[arg(long = "config", default_value = "agent.yaml")]
    pub(crate) config: PathBuf,

    /// Workspace configuration (dataset, checkouts, log root)
    #[arg(long = "workspace", default_value = ".commit0.yaml")]
    pub(crate) workspace: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Run the agent over every selected repository
    Run {
        #[command(flatten)]
        args: ConfigArgs,
    },
    /// Print the work units a run would execute, without calling the agent or touching branches
    Plan {
        #[command(flatten)]
        args: ConfigArgs,
        /// Only this repository (trailing segment of the dataset identifier)
        #[arg(long = "repo")]
        repo: Option<String>,
    },
    /// Print the branch name derived from a run configuration
    RunId {
        /// Run configuration
        #[arg(long = "config", default_value = "agent.yaml")]
        config: PathBuf,
    },
}
