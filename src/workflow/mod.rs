//! Workflow orchestration: extraction with repair, the stage pipeline, and
//! the commands that drive them.
mod aggregate;
mod extract;
mod graph;
mod init;
pub(crate) mod lm_client;
mod pipeline;
mod profile;
mod run;
#[cfg(test)]
pub(crate) mod testing;

pub use extract::{OutputContract, DEFAULT_MAX_RETRIES};
pub use graph::run_stages;
pub use init::run_init;
pub use pipeline::{PipelineArtifact, StageResult, StageStatus};
pub use profile::run_profile;
pub use run::run_run;
