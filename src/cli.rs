//! CLI argument parsing for the proposal pipeline.
//!
//! The CLI stays thin: it resolves inputs and hands them to the workflow
//! module, which owns every decision about stages and providers.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "maestro",
    version,
    about = "LM-driven proposal pipeline with schema-validated extraction and repair",
    after_help = "Commands:\n  run --rfp-file <file>... --out-dir <dir>  Run the stage pipeline for each solicitation\n  profile --signals <file.json>             Select a policy profile from classification signals\n  stages                                    Print the stage graph\n  init [--force]                            Write a maestro.json config stub\n\nExamples:\n  maestro init\n  maestro run --rfp-file agency_rfp.txt --out-dir out --lm \"llm -m gpt-5-nano\"\n  maestro profile --signals signals.json\n  RUST_LOG=debug maestro run --rfp-file a.txt --rfp-file b.txt --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Raise the default log level to debug (RUST_LOG still wins)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Profile(ProfileArgs),
    Stages(StagesArgs),
    Init(InitArgs),
}

/// Run command inputs.
#[derive(Parser, Debug)]
#[command(about = "Run the proposal pipeline for one or more solicitations")]
pub struct RunArgs {
    /// Solicitation text file; repeat to run several documents in parallel
    #[arg(long = "rfp-file", value_name = "FILE", required = true)]
    pub rfp_files: Vec<PathBuf>,

    /// Config file (defaults to ./maestro.json when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// LM command receiving the prompt on stdin (overrides config and MAESTRO_LM_COMMAND)
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Directory receiving the proposal markdown and stage JSON
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,

    /// Retries per stage after the first attempt (overrides config)
    #[arg(long, value_name = "N")]
    pub max_retries: Option<usize>,

    /// Per-call provider timeout in seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Optional stage to skip; repeatable, added to config skip_stages
    #[arg(long = "skip-stage", value_name = "STAGE")]
    pub skip_stages: Vec<String>,

    /// Cancel the remaining documents as soon as one run fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Emit a machine-readable summary per document
    #[arg(long)]
    pub json: bool,
}

/// Profile command inputs.
#[derive(Parser, Debug)]
#[command(about = "Select a policy profile from a classification signals file")]
pub struct ProfileArgs {
    /// JSON file with domain, frameworks, flags, open_questions
    #[arg(long, value_name = "FILE")]
    pub signals: PathBuf,

    /// Config file supplying default_profile and catalog_path
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Stages command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print the stage graph")]
pub struct StagesArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

/// Init command inputs.
#[derive(Parser, Debug)]
#[command(about = "Write a maestro.json config stub")]
pub struct InitArgs {
    /// Where to write the config
    #[arg(long, value_name = "FILE", default_value = "maestro.json")]
    pub config: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}
