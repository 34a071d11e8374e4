//! Generation boundary.
//!
//! A provider takes stage instructions plus context and returns raw text. No
//! retries happen here; the extractor owns retry policy. Every call is bounded
//! by a timeout and observes a shared [`CancelFlag`].
//!
//! Two providers ship:
//!
//! - [`CommandProvider`]: a user-configured local command (`llm -m gpt-5-nano`,
//!   `ollama run ...`, a wrapper script) that receives the prompt on stdin and
//!   replies on stdout.
//! - [`HttpProvider`]: an OpenAI-compatible chat-completions endpoint.
use crate::error::ProviderError;
use crate::util::truncate_string;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const MAX_STDERR_LOG_BYTES: usize = 2000;

/// Opaque text-generation capability.
pub trait GenerationClient: Send + Sync {
    fn generate(&self, instructions: &str, context: &str) -> Result<String, ProviderError>;
}

/// Cooperative cancellation shared between a run and its providers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Single-text prompt for providers without a system/user split.
pub fn compose_prompt(instructions: &str, context: &str) -> String {
    format!("{instructions}\n\n# Context\n\n{context}\n")
}

/// Local command provider; the prompt goes to stdin.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    cancel: CancelFlag,
}

impl CommandProvider {
    pub fn new(command: &str, timeout: Duration, cancel: CancelFlag) -> Result<Self, ProviderError> {
        let mut args = shell_words::split(command).map_err(|err| ProviderError::Spawn {
            program: command.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
        })?;
        if args.is_empty() {
            return Err(ProviderError::EmptyCommand);
        }
        let name = args.remove(0);
        let program = which::which(&name).map_err(|_| ProviderError::NotFound {
            program: name.clone(),
        })?;
        Ok(Self {
            program,
            args,
            timeout,
            cancel,
        })
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl GenerationClient for CommandProvider {
    fn generate(&self, instructions: &str, context: &str) -> Result<String, ProviderError> {
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let prompt = compose_prompt(instructions, context);
        let prompt_bytes = prompt.len();
        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProviderError::Spawn {
                program: self.program_name(),
                source,
            })?;

        // Stdin and both output pipes are serviced on their own threads so a
        // chatty child cannot deadlock against a large prompt.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program = %self.program_name(), "lm invoke cancelled");
                return Err(ProviderError::Cancelled);
            }
            if start.elapsed() > self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                let elapsed_ms = start.elapsed().as_millis();
                tracing::warn!(elapsed_ms, program = %self.program_name(), "lm invoke timed out");
                return Err(ProviderError::Timeout { elapsed_ms });
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A child may exit without draining stdin; that is not a failure.
        let written = match writer {
            Some(handle) => join(handle)?,
            None => Ok(()),
        };
        written.or_else(|err| match err.kind() {
            std::io::ErrorKind::BrokenPipe => Ok(()),
            _ => Err(err),
        })?;
        let stdout = match stdout {
            Some(handle) => join(handle)??,
            None => Vec::new(),
        };
        let stderr = match stderr {
            Some(handle) => join(handle)??,
            None => Vec::new(),
        };
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(
            elapsed_ms,
            prompt_bytes,
            response_bytes = stdout.len(),
            "lm invoke complete"
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let stderr = truncate_string(stderr.trim(), MAX_STDERR_LOG_BYTES);
            tracing::debug!(status = %status, stderr = %stderr, "lm command failed");
            return Err(ProviderError::ExitStatus {
                status: status.to_string(),
                stderr,
            });
        }

        String::from_utf8(stdout).map_err(|err| ProviderError::Decode {
            message: format!("stdout is not UTF-8: {err}"),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join<T>(handle: JoinHandle<T>) -> Result<T, ProviderError> {
    handle
        .join()
        .map_err(|_| ProviderError::Io(std::io::Error::other("lm pipe thread panicked")))
}

/// OpenAI-compatible chat-completions provider.
pub struct HttpProvider {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    cancel: CancelFlag,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpProvider {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
        cancel: CancelFlag,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
            cancel,
        }
    }
}

impl GenerationClient for HttpProvider {
    fn generate(&self, instructions: &str, context: &str) -> Result<String, ProviderError> {
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content: context,
                },
            ],
            temperature: 0.2,
        };
        let start = Instant::now();
        let mut request = self.agent.post(self.endpoint.as_str());
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let mut response = request.send_json(&body).map_err(|err| match err {
            ureq::Error::Timeout(_) => ProviderError::Timeout {
                elapsed_ms: start.elapsed().as_millis(),
            },
            other => {
                tracing::debug!(error = %other, endpoint = %self.endpoint, "lm request failed");
                ProviderError::Http {
                    message: other.to_string(),
                }
            }
        })?;
        let reply: ChatResponse =
            response
                .body_mut()
                .read_json()
                .map_err(|err| ProviderError::Decode {
                    message: err.to_string(),
                })?;
        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Decode {
                message: "reply has no message content".to_string(),
            })?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            prompt_bytes = instructions.len() + context.len(),
            response_bytes = text.len(),
            "lm invoke complete"
        );
        Ok(text)
    }
}
