//! Offline profile selection from a signals file.
use crate::cli::ProfileArgs;
use crate::config::{
    load_config_or_default, resolve_catalog, resolve_default_profile, DEFAULT_PROFILE_ENV,
};
use crate::profiles::{ClassificationSignals, ConfigurationProfile};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;

#[derive(Serialize)]
struct ProfileSelection<'a> {
    selected: &'a str,
    reason: String,
    profile: &'a ConfigurationProfile,
}

pub fn run_profile(args: &ProfileArgs) -> Result<()> {
    let loaded = load_config_or_default(args.config.as_deref())?;
    let default_name =
        resolve_default_profile(&loaded.config, std::env::var(DEFAULT_PROFILE_ENV).ok());
    let catalog = resolve_catalog(&loaded, &default_name)?;

    let bytes = fs::read(&args.signals)
        .with_context(|| format!("read signals {}", args.signals.display()))?;
    let signals: ClassificationSignals =
        serde_json::from_slice(&bytes).context("parse classification signals JSON")?;

    let (profile, reason) = catalog.select(&signals);
    tracing::debug!(profile = %profile.name, reason = %reason, "profile selected");
    let selection = ProfileSelection {
        selected: &profile.name,
        reason: reason.to_string(),
        profile,
    };
    let text = serde_json::to_string_pretty(&selection).context("serialize profile selection")?;
    println!("{text}");
    Ok(())
}
