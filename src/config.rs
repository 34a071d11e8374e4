//! Run configuration helpers.
//!
//! `maestro.json` is optional. Every field has a default so a bare
//! `{"schema_version": 1}` is a complete config; command-line flags and
//! environment variables are layered on top by the resolve helpers.
use crate::profiles::{ProfileCatalog, COMMERCIAL_PROFILE};
use crate::stages::{stage_catalog, StageId};
use crate::workflow::DEFAULT_MAX_RETRIES;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_FILE_NAME: &str = "maestro.json";
pub const LM_COMMAND_ENV: &str = "MAESTRO_LM_COMMAND";
pub const DEFAULT_PROFILE_ENV: &str = "DEFAULT_POLICY_PACK";
pub const DEFAULT_LM_COMMAND: &str = "llm";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
const MAX_RETRIES_LIMIT: usize = 10;

/// Where prompts are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProviderConfig {
    /// Local command receiving the prompt on stdin.
    Command {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// OpenAI-compatible chat-completions endpoint.
    Http {
        endpoint: String,
        model: String,
        /// Name of the environment variable holding the bearer token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key_env: Option<String>,
    },
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::Command { command: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaestroConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// External profile catalog; relative paths resolve against the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub skip_stages: Vec<String>,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

/// A config plus the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: MaestroConfig,
    pub base_dir: PathBuf,
}

/// Build the config written by `maestro init`.
pub fn default_config() -> MaestroConfig {
    MaestroConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        provider: ProviderConfig::Command {
            command: Some(DEFAULT_LM_COMMAND.to_string()),
        },
        timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        max_retries: DEFAULT_MAX_RETRIES,
        default_profile: Some(COMMERCIAL_PROFILE.to_string()),
        catalog_path: None,
        skip_stages: Vec::new(),
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<MaestroConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: MaestroConfig =
        serde_json::from_slice(&bytes).context("parse maestro config JSON")?;
    validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Load `--config` when given, else `./maestro.json` when present, else defaults.
pub fn load_config_or_default(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(CONFIG_FILE_NAME)).filter(|path| path.is_file()),
    };
    let Some(path) = path else {
        tracing::debug!("no config file; using defaults");
        return Ok(LoadedConfig {
            config: MaestroConfig {
                provider: ProviderConfig::default(),
                default_profile: None,
                ..default_config()
            },
            base_dir: PathBuf::from("."),
        });
    };
    let config = load_config(&path)?;
    tracing::debug!(path = %path.display(), "config loaded");
    let base_dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LoadedConfig { config, base_dir })
}

/// Persist a config, refusing to clobber an existing file unless forced.
pub fn write_config(path: &Path, config: &MaestroConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut text = serde_json::to_string_pretty(config).context("serialize maestro config")?;
    text.push('\n');
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate schema version, provider settings, limits, and stage names.
pub fn validate_config(config: &MaestroConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported maestro config schema_version {}",
            config.schema_version
        ));
    }
    match &config.provider {
        ProviderConfig::Command { command } => {
            if command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(anyhow!("provider.command must be non-empty when set"));
            }
        }
        ProviderConfig::Http {
            endpoint,
            model,
            api_key_env,
        } => {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(anyhow!(
                    "provider.endpoint must be an http(s) URL (got {endpoint:?})"
                ));
            }
            if model.trim().is_empty() {
                return Err(anyhow!("provider.model must be non-empty"));
            }
            if api_key_env.as_deref().is_some_and(|name| name.trim().is_empty()) {
                return Err(anyhow!("provider.api_key_env must be non-empty when set"));
            }
        }
    }
    if config.timeout_seconds == 0 {
        return Err(anyhow!("timeout_seconds must be at least 1"));
    }
    if config.max_retries > MAX_RETRIES_LIMIT {
        return Err(anyhow!(
            "max_retries must be at most {MAX_RETRIES_LIMIT} (got {})",
            config.max_retries
        ));
    }
    if config
        .default_profile
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(anyhow!("default_profile must be non-empty when set"));
    }
    skip_set(config)?;
    Ok(())
}

/// Parse `skip_stages`, rejecting unknown and required stage ids.
pub fn skip_set(config: &MaestroConfig) -> Result<BTreeSet<StageId>> {
    let catalog = stage_catalog();
    let mut skip = BTreeSet::new();
    for name in &config.skip_stages {
        let id = StageId::parse(name.trim())
            .ok_or_else(|| anyhow!("skip_stages names unknown stage {name:?}"))?;
        if catalog.iter().any(|spec| spec.id == id && spec.required) {
            return Err(anyhow!("skip_stages cannot include required stage {id}"));
        }
        skip.insert(id);
    }
    Ok(skip)
}

impl MaestroConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// `--lm` flag, then config, then `MAESTRO_LM_COMMAND`, then `llm`.
pub fn resolve_lm_command(
    flag: Option<&str>,
    config: &MaestroConfig,
    env_value: Option<String>,
) -> String {
    let from_config = match &config.provider {
        ProviderConfig::Command { command } => command.clone(),
        ProviderConfig::Http { .. } => None,
    };
    flag.map(str::to_string)
        .or(from_config)
        .or(env_value.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_LM_COMMAND.to_string())
}

/// Config `default_profile`, then `DEFAULT_POLICY_PACK`, then `US_COMMERCIAL`.
pub fn resolve_default_profile(config: &MaestroConfig, env_value: Option<String>) -> String {
    config
        .default_profile
        .clone()
        .or(env_value.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| COMMERCIAL_PROFILE.to_string())
}

/// Built-in catalog, or the external one named by `catalog_path`.
pub fn resolve_catalog(loaded: &LoadedConfig, default_profile: &str) -> Result<ProfileCatalog> {
    match &loaded.config.catalog_path {
        Some(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                loaded.base_dir.join(path)
            };
            ProfileCatalog::load(&path, default_profile)
        }
        None => ProfileCatalog::builtin(default_profile),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
