//! Schema-validated extraction with repair retries.
//!
//! The extractor sends a stage prompt to the generation client, checks the
//! reply against the stage's output contract, and on failure re-issues the
//! prompt with the previous error echoed back verbatim. `max_retries` counts
//! calls after the first, so the default of 2 allows up to 3 calls.
use crate::error::{AttemptError, ExtractionFailed, ProviderError};
use crate::schema::ExtractionSchema;
use crate::util::truncate_string;
use crate::workflow::lm_client::GenerationClient;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Instant;

/// Maximum number of repair attempts after the first call.
pub const DEFAULT_MAX_RETRIES: usize = 2;

const RETRY_SNIPPET_BYTES: usize = 1000;
const FAILURE_PREVIEW_BYTES: usize = 500;

/// What a stage reply must look like to be accepted.
#[derive(Debug, Clone)]
pub enum OutputContract {
    Json(ExtractionSchema),
    /// Markdown containing a table with at least these header cells.
    MarkdownTable { columns: &'static [&'static str] },
    Text,
}

impl OutputContract {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::MarkdownTable { .. } => "markdown table",
            Self::Text => "text",
        }
    }

    /// Contract statement embedded in every prompt, restated on repair.
    pub fn describe(&self) -> String {
        match self {
            Self::Json(schema) => format!(
                "Respond with a single JSON value matching this JSON Schema \
                 (no prose before or after it):\n\n```json\n{}\n```\n",
                schema.describe()
            ),
            Self::MarkdownTable { columns } => format!(
                "Respond in markdown. Include a table whose header row has the columns: \
                 {}. The header row must be followed immediately by a separator row \
                 (`|---|---|`).\n",
                columns.join(" | ")
            ),
            Self::Text => "Respond in markdown. The reply must not be empty.\n".to_string(),
        }
    }

    /// Accept or reject one raw reply, returning the validated value.
    pub fn check(&self, raw: &str) -> Result<Value, AttemptError> {
        match self {
            Self::Json(schema) => {
                let json_text = extract_json(raw);
                let value: Value =
                    serde_json::from_str(json_text).map_err(|err| AttemptError::Parse {
                        message: describe_parse_error(json_text, &err),
                    })?;
                schema.validate(&value).map_err(AttemptError::Schema)?;
                Ok(value)
            }
            Self::MarkdownTable { columns } => {
                check_table(raw, columns).map_err(|message| AttemptError::Contract { message })?;
                Ok(Value::String(raw.trim().to_string()))
            }
            Self::Text => {
                let text = raw.trim();
                if text.is_empty() {
                    return Err(AttemptError::Contract {
                        message: "reply is empty".to_string(),
                    });
                }
                Ok(Value::String(text.to_string()))
            }
        }
    }
}

/// Strip an enclosing code fence. Text that already parses as JSON is kept
/// whole, so backticks inside string values are never mistaken for fences.
///
/// Otherwise a fence opens on a line starting with three backticks plus an
/// optional language tag and closes on the next line that is exactly three
/// backticks. The first fenced block wins; prose outside it is discarded. An
/// unterminated fence keeps everything after the opener.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if serde_json::from_str::<Value>(text).is_ok() {
        return text;
    }
    let mut offset = 0;
    let mut body_start = None;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();
        match body_start {
            None => {
                let Some(tag) = trimmed.strip_prefix("```") else {
                    continue;
                };
                if is_fence_tag(tag) {
                    body_start = Some(offset);
                } else if let Some(inline) = tag.strip_suffix("```") {
                    return inline.trim();
                }
            }
            Some(body) if trimmed == "```" => return text[body..line_start].trim(),
            Some(_) => {}
        }
    }
    match body_start {
        Some(body) => text[body..].trim(),
        None => text,
    }
}

fn is_fence_tag(tag: &str) -> bool {
    tag.trim()
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

fn describe_parse_error(json_text: &str, err: &serde_json::Error) -> String {
    if json_text.is_empty() {
        return "empty response".to_string();
    }
    match json_text.lines().nth(err.line().saturating_sub(1)) {
        Some(line) if err.line() > 0 => {
            format!("{err} (line {}: {})", err.line(), truncate_string(line.trim(), 120))
        }
        _ => err.to_string(),
    }
}

fn separator_row() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| {
        Regex::new(r"^\s*\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?\s*$")
            .expect("regex for table separator rows")
    })
}

fn table_cells(row: &str) -> Vec<String> {
    row.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| cell.trim_matches(|ch: char| ch.is_whitespace() || ch == '*' || ch == '`'))
        .map(str::to_ascii_lowercase)
        .collect()
}

fn check_table(raw: &str, columns: &[&str]) -> Result<(), String> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut closest: Option<Vec<&str>> = None;
    for pair in lines.windows(2) {
        let (header, separator) = (pair[0], pair[1]);
        if !header.contains('|') || !separator_row().is_match(separator) {
            continue;
        }
        let cells = table_cells(header);
        let missing: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|column| !cells.contains(&column.to_ascii_lowercase()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        match &closest {
            Some(best) if best.len() <= missing.len() => {}
            _ => closest = Some(missing),
        }
    }
    match closest {
        Some(missing) => Err(format!("table is missing columns: {}", missing.join(", "))),
        None => Err(format!(
            "no markdown table found; expected header row with columns: {}",
            columns.join(" | ")
        )),
    }
}

/// One stage's extraction inputs.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    /// Stage id, emitted as the `STAGE:` marker line.
    pub stage: &'a str,
    pub instructions: &'a str,
    pub context: &'a str,
    pub contract: &'a OutputContract,
}

/// Accepted reply plus provenance.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub value: Value,
    pub raw_text: String,
    pub attempts: usize,
    /// Errors that triggered each repair retry, in order.
    pub repairs: Vec<String>,
}

pub struct Extractor<'a> {
    client: &'a dyn GenerationClient,
    max_retries: usize,
}

impl<'a> Extractor<'a> {
    pub fn new(client: &'a dyn GenerationClient, max_retries: usize) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    pub fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Extraction, ExtractionFailed> {
        let total = self.max_retries + 1;
        let start = Instant::now();
        let mut last_error: Option<AttemptError> = None;
        let mut last_raw = String::new();
        let mut repairs = Vec::new();
        let mut attempts = 0;

        while attempts < total {
            attempts += 1;
            let instructions = match &last_error {
                None => build_prompt(request),
                Some(err) => {
                    tracing::warn!(
                        stage = request.stage,
                        attempt = attempts,
                        max = total,
                        error = %err,
                        "repair retry"
                    );
                    repairs.push(err.to_string());
                    build_repair_prompt(request, err, &last_raw)
                }
            };

            let raw = match self.client.generate(&instructions, request.context) {
                Ok(raw) => raw,
                Err(ProviderError::Cancelled) => {
                    last_error = Some(AttemptError::Provider(ProviderError::Cancelled));
                    break;
                }
                Err(err) => {
                    tracing::debug!(stage = request.stage, attempt = attempts, error = %err, "provider error");
                    last_error = Some(err.into());
                    last_raw.clear();
                    continue;
                }
            };

            match request.contract.check(&raw) {
                Ok(value) => {
                    tracing::info!(
                        stage = request.stage,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis(),
                        "extraction accepted"
                    );
                    return Ok(Extraction {
                        value,
                        raw_text: raw,
                        attempts,
                        repairs,
                    });
                }
                Err(err) => {
                    tracing::debug!(stage = request.stage, attempt = attempts, error = %err, "reply rejected");
                    last_error = Some(err);
                    last_raw = raw;
                }
            }
        }

        Err(ExtractionFailed {
            attempts,
            last_error: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
            last_raw_preview: truncate_string(&last_raw, FAILURE_PREVIEW_BYTES),
        })
    }
}

/// First-attempt prompt: marker, instructions, contract.
pub fn build_prompt(request: &ExtractionRequest<'_>) -> String {
    format!(
        "STAGE: {}\n\n{}\n\n## Output Contract\n\n{}",
        request.stage,
        request.instructions.trim_end(),
        request.contract.describe()
    )
}

fn build_repair_prompt(
    request: &ExtractionRequest<'_>,
    error: &AttemptError,
    previous_response: &str,
) -> String {
    let mut prompt = build_prompt(request);
    prompt.push_str("\n## Previous Response Error\n\n");
    if error.is_provider() {
        prompt.push_str(&format!(
            "The previous request did not complete ({error}). Answer the original task.\n"
        ));
        return prompt;
    }
    prompt.push_str(&format!(
        "Your previous response was rejected. Fix the error and reply again, \
         honoring the output contract above.\n\n**Error:** {error}\n\n"
    ));
    if !previous_response.is_empty() {
        let snippet = if previous_response.len() > RETRY_SNIPPET_BYTES {
            format!(
                "{}...(truncated)",
                truncate_string(previous_response, RETRY_SNIPPET_BYTES)
            )
        } else {
            previous_response.to_string()
        };
        prompt.push_str(&format!(
            "**Your previous response (may be truncated):**\n```\n{snippet}\n```\n"
        ));
    }
    prompt
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
