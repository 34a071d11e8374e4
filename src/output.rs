//! Writes the aggregate proposal and per-stage results for one run.
use crate::profiles::ClassificationSignals;
use crate::workflow::{PipelineArtifact, StageResult};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const STAGES_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct StagesFile<'a> {
    schema_version: u32,
    generated_at_epoch_ms: u128,
    source: &'a str,
    profile: &'a str,
    selection_reason: &'a str,
    signals: &'a ClassificationSignals,
    warnings: &'a [String],
    stages: &'a [StageResult],
}

/// Paths written for one document.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct WrittenOutputs {
    pub(crate) proposal: PathBuf,
    pub(crate) stages: PathBuf,
}

/// Write `<stem>_proposal_<ms>.md` and `<stem>_stages_<ms>.json` into `out_dir`.
pub(crate) fn write_outputs(
    out_dir: &Path,
    stem: &str,
    artifact: &PipelineArtifact,
    epoch_ms: u128,
) -> Result<WrittenOutputs> {
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;

    let proposal = out_dir.join(format!("{stem}_proposal_{epoch_ms}.md"));
    fs::write(&proposal, artifact.markdown.as_bytes())
        .with_context(|| format!("write {}", proposal.display()))?;

    let report = StagesFile {
        schema_version: STAGES_SCHEMA_VERSION,
        generated_at_epoch_ms: epoch_ms,
        source: &artifact.source,
        profile: &artifact.profile,
        selection_reason: &artifact.selection_reason,
        signals: &artifact.signals,
        warnings: &artifact.warnings,
        stages: &artifact.stages,
    };
    let stages = out_dir.join(format!("{stem}_stages_{epoch_ms}.json"));
    let bytes = serde_json::to_vec_pretty(&report).context("serialize stage results")?;
    fs::write(&stages, bytes).with_context(|| format!("write {}", stages.display()))?;

    Ok(WrittenOutputs { proposal, stages })
}
