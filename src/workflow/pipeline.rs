//! Stage orchestration for one requirement document.
//!
//! A run classifies the document, selects one configuration profile, then
//! executes the remaining stages strictly in declaration order. Each stage
//! sees the document plus the validated output of its declared dependencies
//! and nothing else. Optional stage failures degrade to a placeholder result;
//! a required stage failure ends the run.
use crate::document::RequirementDocument;
use crate::error::{ExtractionFailed, PipelineError};
use crate::normalize::normalize;
use crate::profiles::{pack_context, ClassificationSignals, ConfigurationProfile, ProfileCatalog};
use crate::stages::{validate_graph, StageId, StageSpec};
use crate::workflow::aggregate::render_artifact;
use crate::workflow::extract::{ExtractionRequest, Extractor, DEFAULT_MAX_RETRIES};
use crate::workflow::lm_client::{CancelFlag, GenerationClient};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    ClassificationDone,
    ProfileSelected,
    StageRunning(StageId),
    Aggregated,
    Delivered,
    Failed(StageId),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::ClassificationDone => write!(f, "classification_done"),
            Self::ProfileSelected => write!(f, "profile_selected"),
            Self::StageRunning(stage) => write!(f, "stage_running({stage})"),
            Self::Aggregated => write!(f, "aggregated"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// Optional stage that exhausted its retries.
    Degraded,
    Skipped,
}

/// Validated, normalized output of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: StageId,
    pub title: &'static str,
    pub status: StageStatus,
    pub raw_text: String,
    /// `null` unless the stage succeeded.
    pub validated: Value,
    pub normalization_warnings: Vec<String>,
    pub attempts: usize,
    pub repairs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl StageResult {
    fn placeholder(spec: &StageSpec, status: StageStatus, attempts: usize, reason: String) -> Self {
        Self {
            stage: spec.id,
            title: spec.title,
            status,
            raw_text: String::new(),
            validated: Value::Null,
            normalization_warnings: Vec::new(),
            attempts,
            repairs: Vec::new(),
            failure: Some(reason),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

/// Final aggregate of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineArtifact {
    pub source: String,
    pub profile: String,
    pub selection_reason: String,
    pub signals: ClassificationSignals,
    pub stages: Vec<StageResult>,
    pub warnings: Vec<String>,
    pub markdown: String,
    #[serde(skip)]
    pub transitions: Vec<RunState>,
}

impl PipelineArtifact {
    /// Record that the run's outputs reached their destination.
    pub fn mark_delivered(&mut self) {
        self.transitions.push(RunState::Delivered);
        tracing::info!(source = %self.source, state = %RunState::Delivered, "run delivered");
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_retries: usize,
    pub skip: BTreeSet<StageId>,
    pub cancel: CancelFlag,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            skip: BTreeSet::new(),
            cancel: CancelFlag::new(),
        }
    }
}

/// Validated stage graph bound to a provider and a profile catalog.
pub struct Pipeline<'a> {
    stages: Vec<StageSpec>,
    catalog: &'a ProfileCatalog,
    client: &'a dyn GenerationClient,
    options: PipelineOptions,
}

struct Tracker {
    state: RunState,
    history: Vec<RunState>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            state: RunState::Pending,
            history: vec![RunState::Pending],
        }
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "run state");
        self.state = next;
        self.history.push(next);
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(
        stages: Vec<StageSpec>,
        catalog: &'a ProfileCatalog,
        client: &'a dyn GenerationClient,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        validate_graph(&stages)?;
        for skipped in &options.skip {
            match stages.iter().find(|stage| stage.id == *skipped) {
                Some(stage) if stage.required => {
                    return Err(PipelineError::Graph {
                        message: format!("required stage {skipped} cannot be skipped"),
                    })
                }
                Some(_) => {}
                None => {
                    return Err(PipelineError::Graph {
                        message: format!("skipped stage {skipped} is not in the graph"),
                    })
                }
            }
        }
        Ok(Self {
            stages,
            catalog,
            client,
            options,
        })
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn run(&self, document: &RequirementDocument) -> Result<PipelineArtifact, PipelineError> {
        let start = Instant::now();
        let mut tracker = Tracker::new();
        let mut results: Vec<StageResult> = Vec::new();
        let source = document.label();

        let mut remaining = self.stages.as_slice();
        let mut signals = ClassificationSignals::default();
        if let Some((first, rest)) = remaining.split_first() {
            if first.id == StageId::Classification {
                remaining = rest;
                let result = self.execute(first, document, None, &results, &mut tracker)?;
                signals = decode_signals(&result);
                results.push(result);
            }
        }
        tracker.advance(RunState::ClassificationDone);

        let (profile, reason) = self.catalog.select(&signals);
        tracing::info!(
            source = %source,
            profile = %profile.name,
            reason = %reason,
            "profile selected"
        );
        tracker.advance(RunState::ProfileSelected);

        for spec in remaining {
            let result = self.execute(spec, document, Some(profile), &results, &mut tracker)?;
            results.push(result);
        }

        let warnings: Vec<String> = results
            .iter()
            .flat_map(|result| {
                let failure = result
                    .failure
                    .iter()
                    .map(move |reason| format!("{}: {reason}", result.stage));
                let coercions = result
                    .normalization_warnings
                    .iter()
                    .map(move |warning| format!("{}: {warning}", result.stage));
                failure.chain(coercions)
            })
            .collect();
        let markdown = render_artifact(&source, &profile.name, &results);
        tracker.advance(RunState::Aggregated);
        tracing::info!(
            source = %source,
            stages = results.len(),
            warnings = warnings.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "run aggregated"
        );

        Ok(PipelineArtifact {
            source,
            profile: profile.name.clone(),
            selection_reason: reason.to_string(),
            signals,
            stages: results,
            warnings,
            markdown,
            transitions: tracker.history,
        })
    }

    fn execute(
        &self,
        spec: &StageSpec,
        document: &RequirementDocument,
        profile: Option<&ConfigurationProfile>,
        prior: &[StageResult],
        tracker: &mut Tracker,
    ) -> Result<StageResult, PipelineError> {
        if self.options.cancel.is_cancelled() {
            tracker.advance(RunState::Failed(spec.id));
            return Err(PipelineError::Cancelled { stage: spec.id });
        }
        tracker.advance(RunState::StageRunning(spec.id));

        if self.options.skip.contains(&spec.id) {
            tracing::info!(stage = %spec.id, "stage skipped by configuration");
            return Ok(StageResult::placeholder(
                spec,
                StageStatus::Skipped,
                0,
                "skipped by configuration".to_string(),
            ));
        }

        let context = stage_context(spec, document, profile, prior);
        let request = ExtractionRequest {
            stage: spec.id.as_str(),
            instructions: spec.instructions,
            context: &context,
            contract: &spec.contract,
        };
        let extractor = Extractor::new(self.client, self.options.max_retries);
        match extractor.extract(&request) {
            Ok(extraction) => {
                let (validated, normalization_warnings) = match spec.normalizer {
                    Some(kind) => {
                        let normalized = normalize(kind, &extraction.value);
                        (normalized.value, normalized.warnings)
                    }
                    None => (extraction.value, Vec::new()),
                };
                tracing::info!(
                    stage = %spec.id,
                    attempts = extraction.attempts,
                    warnings = normalization_warnings.len(),
                    "stage complete"
                );
                Ok(StageResult {
                    stage: spec.id,
                    title: spec.title,
                    status: StageStatus::Succeeded,
                    raw_text: extraction.raw_text,
                    validated,
                    normalization_warnings,
                    attempts: extraction.attempts,
                    repairs: extraction.repairs,
                    failure: None,
                })
            }
            Err(failed) => self.on_failure(spec, failed, tracker),
        }
    }

    fn on_failure(
        &self,
        spec: &StageSpec,
        failed: ExtractionFailed,
        tracker: &mut Tracker,
    ) -> Result<StageResult, PipelineError> {
        if self.options.cancel.is_cancelled() {
            tracker.advance(RunState::Failed(spec.id));
            return Err(PipelineError::Cancelled { stage: spec.id });
        }
        if spec.required {
            tracing::error!(
                stage = %spec.id,
                attempts = failed.attempts,
                error = %failed.last_error,
                "required stage failed"
            );
            tracing::debug!(stage = %spec.id, preview = %failed.last_raw_preview, "last reply");
            tracker.advance(RunState::Failed(spec.id));
            return Err(PipelineError::StageFailed {
                stage: spec.id,
                source: failed,
            });
        }
        tracing::warn!(
            stage = %spec.id,
            attempts = failed.attempts,
            error = %failed.last_error,
            "optional stage degraded"
        );
        Ok(StageResult::placeholder(
            spec,
            StageStatus::Degraded,
            failed.attempts,
            failed.to_string(),
        ))
    }
}

fn decode_signals(result: &StageResult) -> ClassificationSignals {
    if !result.succeeded() {
        return ClassificationSignals::default();
    }
    serde_json::from_value(result.validated.clone()).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "classification signals unreadable; using defaults");
        ClassificationSignals::default()
    })
}

/// Document text, active profile for pack-aware stages, and dependency outputs.
fn stage_context(
    spec: &StageSpec,
    document: &RequirementDocument,
    profile: Option<&ConfigurationProfile>,
    prior: &[StageResult],
) -> String {
    let mut context = String::new();
    if let Some(profile) = profile.filter(|_| spec.pack_aware) {
        context.push_str(&pack_context(profile));
        context.push_str("\n\n");
    }
    context.push_str(&format!("## Solicitation ({})\n\n", document.label()));
    context.push_str(document.text().trim_end());
    context.push('\n');
    for dep in &spec.deps {
        let Some(result) = prior.iter().find(|result| result.stage == *dep) else {
            continue;
        };
        context.push_str(&format!("\n## {} ({})\n\n", result.title, result.stage));
        context.push_str(&dependency_text(result));
        context.push('\n');
    }
    context
}

fn dependency_text(result: &StageResult) -> String {
    match (&result.validated, &result.failure) {
        (Value::String(text), _) => text.clone(),
        (Value::Null, Some(reason)) => format!("(unavailable: {reason})"),
        (value, _) => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
