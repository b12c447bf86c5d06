use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;

use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    // Agent API keys usually live in .env next to the configs
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Some(mode) = cli.color {
        fleet_coder::set_color_mode(mode);
    }
    fleet_coder::telemetry_init(cli.verbose);
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        target = env!("FLEET_CODER_BUILD_TARGET"),
        built = env!("FLEET_CODER_BUILD_DATE"),
        "fleet-coder starting"
    );

    match &cli.command {
        Command::Run { args } => commands::run_fleet_cmd(args),
        Command::Plan { args, repo } => commands::run_plan(args, repo.as_deref()),
        Command::RunId { config } => commands::run_run_id(config),
    }
}
