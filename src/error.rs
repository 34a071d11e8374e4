//! Error taxonomy for the extraction pipeline.
//!
//! Provider failures, per-attempt structural errors and exhausted extractions
//! are distinct types so the orchestrator can decide between retrying,
//! degrading an optional stage and halting the run.
use crate::schema::SchemaViolation;
use crate::stages::StageId;
use thiserror::Error;

/// Failure talking to the generation boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("LM command is empty")]
    EmptyCommand,

    #[error("LM command not found: {program}")]
    NotFound { program: String },

    #[error("spawn LM command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("LM command i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("LM call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u128 },

    #[error("LM call cancelled")]
    Cancelled,

    #[error("LM command exited with status {status}")]
    ExitStatus { status: String, stderr: String },

    #[error("LM endpoint request failed: {message}")]
    Http { message: String },

    #[error("LM reply could not be decoded: {message}")]
    Decode { message: String },
}

impl ProviderError {
    /// Short category used in user-visible messages; raw transport detail stays in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyCommand | Self::NotFound { .. } | Self::Spawn { .. } => "provider unavailable",
            Self::Io(_) => "provider i/o failure",
            Self::Timeout { .. } => "provider timeout",
            Self::Cancelled => "cancelled",
            Self::ExitStatus { .. } => "provider exited with failure",
            Self::Http { .. } => "provider request failed",
            Self::Decode { .. } => "provider reply undecodable",
        }
    }
}

/// Why a single extraction attempt was rejected.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("{}", .0.category())]
    Provider(ProviderError),

    #[error("reply is not valid JSON: {message}")]
    Parse { message: String },

    #[error("reply does not match schema: {0}")]
    Schema(SchemaViolation),

    #[error("reply does not honor output contract: {message}")]
    Contract { message: String },
}

impl AttemptError {
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

impl From<ProviderError> for AttemptError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

/// Retries exhausted without a conformant reply.
#[derive(Debug, Error)]
#[error("no valid reply after {attempts} attempts; last error: {last_error}")]
pub struct ExtractionFailed {
    pub attempts: usize,
    pub last_error: String,
    pub last_raw_preview: String,
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid stage graph: {message}")]
    Graph { message: String },

    #[error("stage {stage} failed: {source}")]
    StageFailed {
        stage: StageId,
        #[source]
        source: ExtractionFailed,
    },

    #[error("run cancelled before stage {stage}")]
    Cancelled { stage: StageId },
}

impl PipelineError {
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Graph { .. } => None,
            Self::StageFailed { stage, .. } | Self::Cancelled { stage } => Some(*stage),
        }
    }
}
