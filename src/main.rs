use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod document;
mod error;
mod normalize;
mod output;
mod profiles;
mod schema;
mod stages;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Run(run) => workflow::run_run(run),
        Command::Profile(profile) => workflow::run_profile(profile),
        Command::Stages(stages) => workflow::run_stages(stages),
        Command::Init(init) => workflow::run_init(init),
    }
}

/// Logs go to stderr so stdout stays machine-readable; RUST_LOG overrides.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
