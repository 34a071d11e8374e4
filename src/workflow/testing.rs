//! In-memory provider that answers per stage from a script.
use crate::error::ProviderError;
use crate::workflow::lm_client::GenerationClient;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub stage: String,
    pub instructions: String,
    pub context: String,
}

/// Replies are queued per `STAGE:` marker; the last reply of a queue repeats.
#[derive(Debug, Default)]
pub(crate) struct ScriptedProvider {
    scripts: Mutex<BTreeMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, stage: &str, text: &str) -> Self {
        self.push(stage, Reply::Text(text.to_string()))
    }

    pub fn push(self, stage: &str, reply: Reply) -> Self {
        self.scripts
            .lock()
            .expect("script lock")
            .entry(stage.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_for(&self, stage: &str) -> usize {
        self.calls().iter().filter(|call| call.stage == stage).count()
    }
}

fn stage_marker(instructions: &str) -> String {
    instructions
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("STAGE:"))
        .map(|stage| stage.trim().to_string())
        .unwrap_or_default()
}

impl GenerationClient for ScriptedProvider {
    fn generate(&self, instructions: &str, context: &str) -> Result<String, ProviderError> {
        let stage = stage_marker(instructions);
        self.calls.lock().expect("calls lock").push(Call {
            stage: stage.clone(),
            instructions: instructions.to_string(),
            context: context.to_string(),
        });
        let mut scripts = self.scripts.lock().expect("script lock");
        let queue = scripts.get_mut(&stage).ok_or_else(|| ProviderError::Http {
            message: format!("no script for stage {stage}"),
        })?;
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Timeout) => Err(ProviderError::Timeout { elapsed_ms: 0 }),
            Some(Reply::Cancelled) => Err(ProviderError::Cancelled),
            None => Err(ProviderError::Http {
                message: format!("script for stage {stage} is empty"),
            }),
        }
    }
}
