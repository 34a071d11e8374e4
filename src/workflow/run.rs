//! `maestro run`: load documents, build the provider, run one pipeline per
//! document on scoped threads, then write each run's outputs.
//!
//! Runs share only the read-only stage graph, profile catalog and provider.
//! Without `--fail-fast` one document failing does not stop the others; the
//! command still exits non-zero when any run failed.
use crate::cli::RunArgs;
use crate::config::{
    load_config_or_default, resolve_catalog, resolve_default_profile, resolve_lm_command,
    skip_set, validate_config, MaestroConfig, ProviderConfig, DEFAULT_PROFILE_ENV,
    LM_COMMAND_ENV,
};
use crate::document::RequirementDocument;
use crate::error::PipelineError;
use crate::output::{write_outputs, WrittenOutputs};
use crate::stages::{stage_catalog, StageId};
use crate::util::{display_path, now_epoch_ms};
use crate::workflow::lm_client::{CancelFlag, CommandProvider, GenerationClient, HttpProvider};
use crate::workflow::pipeline::{Pipeline, PipelineArtifact, PipelineOptions};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::thread;

#[derive(Debug, Serialize)]
struct RunSummary {
    source: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: Option<WrittenOutputs>,
    degraded_stages: Vec<StageId>,
    warnings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_stage: Option<StageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run_run(args: &RunArgs) -> Result<()> {
    let loaded = load_config_or_default(args.config.as_deref())?;
    let config = apply_overrides(&loaded.config, args)?;
    let skip = skip_set(&config)?;

    let documents = args
        .rfp_files
        .iter()
        .map(|path| RequirementDocument::load(path))
        .collect::<Result<Vec<_>>>()?;

    let default_name = resolve_default_profile(&config, std::env::var(DEFAULT_PROFILE_ENV).ok());
    let catalog = resolve_catalog(&loaded, &default_name)?;

    let cancel = CancelFlag::new();
    let provider = build_provider(&config, args.lm.as_deref(), cancel.clone())?;
    let options = PipelineOptions {
        max_retries: config.max_retries,
        skip,
        cancel: cancel.clone(),
    };
    let pipeline = Pipeline::new(stage_catalog(), &catalog, provider.as_ref(), options)?;
    tracing::info!(
        documents = documents.len(),
        stages = pipeline.stages().len(),
        catalog_version = catalog.version(),
        profiles = catalog.profiles().len(),
        max_retries = config.max_retries,
        timeout_seconds = config.timeout_seconds,
        "run starting"
    );

    let fail_fast = args.fail_fast.then_some(&cancel);
    let outcomes = run_documents(&pipeline, &documents, fail_fast)?;

    let stems = output_stems(&documents);
    let mut summaries = Vec::new();
    let mut failures = 0usize;
    for ((document, outcome), stem) in documents.iter().zip(outcomes).zip(stems) {
        let source = document.label();
        match outcome {
            Ok(mut artifact) => {
                let written = write_outputs(&args.out_dir, &stem, &artifact, now_epoch_ms()?)?;
                artifact.mark_delivered();
                if !args.json {
                    println!("{}", display_path(&written.proposal, None));
                    println!("{}", display_path(&written.stages, None));
                }
                summaries.push(delivered_summary(source, &artifact, written));
            }
            Err(err) => {
                failures += 1;
                tracing::error!(source = %source, error = %err, "run failed");
                eprintln!("error: {source}: {err}");
                summaries.push(RunSummary {
                    source,
                    status: "failed",
                    profile: None,
                    outputs: None,
                    degraded_stages: Vec::new(),
                    warnings: 0,
                    failed_stage: err.stage(),
                    error: Some(err.to_string()),
                });
            }
        }
    }

    if args.json {
        let text = serde_json::to_string_pretty(&summaries).context("serialize run summary")?;
        println!("{text}");
    }
    if failures > 0 {
        return Err(anyhow!("{failures} of {} runs failed", documents.len()));
    }
    Ok(())
}

fn apply_overrides(base: &MaestroConfig, args: &RunArgs) -> Result<MaestroConfig> {
    let mut config = base.clone();
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(timeout) = args.timeout_secs {
        config.timeout_seconds = timeout;
    }
    for stage in &args.skip_stages {
        if !config.skip_stages.contains(stage) {
            config.skip_stages.push(stage.clone());
        }
    }
    validate_config(&config).context("invalid run options")?;
    Ok(config)
}

/// `--lm` always selects the command provider; otherwise the config decides.
fn build_provider(
    config: &MaestroConfig,
    lm_flag: Option<&str>,
    cancel: CancelFlag,
) -> Result<Box<dyn GenerationClient>> {
    if let (
        ProviderConfig::Http {
            endpoint,
            model,
            api_key_env,
        },
        None,
    ) = (&config.provider, lm_flag)
    {
        let api_key = match api_key_env {
            Some(name) => Some(
                std::env::var(name)
                    .with_context(|| format!("read provider api key from ${name}"))?,
            ),
            None => None,
        };
        tracing::info!(endpoint = %endpoint, model = %model, "using http provider");
        return Ok(Box::new(HttpProvider::new(
            endpoint,
            model,
            api_key,
            config.timeout(),
            cancel,
        )));
    }
    let command = resolve_lm_command(lm_flag, config, std::env::var(LM_COMMAND_ENV).ok());
    tracing::info!(command = %command, "using command provider");
    let provider = CommandProvider::new(&command, config.timeout(), cancel)
        .with_context(|| format!("configure LM command {command:?}"))?;
    Ok(Box::new(provider))
}

/// One scoped thread per document; `fail_fast` cancels the rest on a failure.
fn run_documents(
    pipeline: &Pipeline<'_>,
    documents: &[RequirementDocument],
    fail_fast: Option<&CancelFlag>,
) -> Result<Vec<Result<PipelineArtifact, PipelineError>>> {
    thread::scope(|scope| {
        let handles: Vec<_> = documents
            .iter()
            .map(|document| {
                scope.spawn(move || {
                    let outcome = pipeline.run(document);
                    if let (Err(err), Some(cancel)) = (&outcome, fail_fast) {
                        tracing::warn!(
                            source = %document.label(),
                            error = %err,
                            "cancelling remaining runs"
                        );
                        cancel.cancel();
                    }
                    outcome
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().map_err(|_| anyhow!("pipeline thread panicked"))
            })
            .collect()
    })
}

/// File stems, suffixed when two documents share one.
fn output_stems(documents: &[RequirementDocument]) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    documents
        .iter()
        .map(|document| {
            let stem = document.stem();
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                stem
            } else {
                format!("{stem}_{count}")
            }
        })
        .collect()
}

fn delivered_summary(
    source: String,
    artifact: &PipelineArtifact,
    written: WrittenOutputs,
) -> RunSummary {
    RunSummary {
        source,
        status: "delivered",
        profile: Some(artifact.profile.clone()),
        outputs: Some(written),
        degraded_stages: artifact
            .stages
            .iter()
            .filter(|result| !result.succeeded())
            .map(|result| result.stage)
            .collect(),
        warnings: artifact.warnings.len(),
        failed_stage: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_stems_get_suffixes() {
        let documents = vec![
            RequirementDocument::new("a", Some("one/rfp.txt".into())),
            RequirementDocument::new("b", Some("two/rfp.txt".into())),
            RequirementDocument::new("c", Some("bid.txt".into())),
        ];
        assert_eq!(output_stems(&documents), vec!["rfp", "rfp_2", "bid"]);
    }

    #[test]
    fn lm_flag_wins_over_http_config() {
        let config = MaestroConfig {
            provider: ProviderConfig::Http {
                endpoint: "https://api.example.test/v1/chat/completions".to_string(),
                model: "m".to_string(),
                api_key_env: Some("MAESTRO_TEST_UNSET_KEY".to_string()),
            },
            ..crate::config::default_config()
        };
        let provider = build_provider(&config, Some("cat"), CancelFlag::new());
        assert!(provider.is_ok());
        let err = build_provider(&config, None, CancelFlag::new())
            .err()
            .expect("missing key");
        assert!(err.to_string().contains("MAESTRO_TEST_UNSET_KEY"));
    }
}
