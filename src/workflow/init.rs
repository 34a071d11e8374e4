//! Workflow init step: write a config stub the user can edit.
use crate::cli::InitArgs;
use crate::config::{default_config, write_config};
use anyhow::Result;

pub fn run_init(args: &InitArgs) -> Result<()> {
    write_config(&args.config, &default_config(), args.force)?;
    tracing::info!(path = %args.config.display(), force = args.force, "config written");
    println!("wrote {}", args.config.display());
    Ok(())
}
