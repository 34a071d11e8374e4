//! Markdown rendering of a finished run.
//!
//! Stage outputs are concatenated in declaration order and the result is
//! passed through [`dedupe_consecutive_lines`], since providers frequently
//! repeat headings or rows across adjacent stages.
use crate::normalize::{ComplianceMatrix, EvidencePack, FactCheckReport, RedTeamIssue};
use crate::stages::StageId;
use crate::workflow::pipeline::{StageResult, StageStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

pub fn render_artifact(source: &str, profile: &str, results: &[StageResult]) -> String {
    let mut out = format!("# Proposal Package: {source}\n\nActive policy profile: {profile}\n");
    for result in results {
        out.push('\n');
        out.push_str(&render_stage(result));
    }
    dedupe_consecutive_lines(&out)
}

/// Drop lines equal (trimmed, case-insensitive) to the line before them.
/// The first line of each run is kept verbatim.
pub fn dedupe_consecutive_lines(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut previous: Option<String> = None;
    for line in text.split('\n') {
        let normalized = line.trim().to_lowercase();
        if previous.as_deref() == Some(normalized.as_str()) {
            continue;
        }
        kept.push(line);
        previous = Some(normalized);
    }
    kept.join("\n")
}

pub fn render_stage(result: &StageResult) -> String {
    let heading = format!("## {}\n\n", result.title);
    let body = match result.status {
        StageStatus::Skipped => "_Stage skipped by configuration._\n".to_string(),
        StageStatus::Degraded => format!(
            "_Missing input: this stage did not produce a valid reply ({})._\n",
            result.failure.as_deref().unwrap_or("no reason recorded")
        ),
        StageStatus::Succeeded => render_body(result.stage, &result.validated),
    };
    heading + &body
}

fn render_body(stage: StageId, value: &Value) -> String {
    if let Value::String(text) = value {
        return format!("{}\n", text.trim_end());
    }
    let rendered = match stage {
        StageId::RfpAnalysis => decode(value).map(|analysis: RfpAnalysis| analysis.render()),
        StageId::ComplianceMatrix => decode(value).map(|matrix: ComplianceMatrix| {
            table(
                &[
                    "Requirement",
                    "Section",
                    "Page",
                    "Status",
                    "Owner",
                    "Artifact",
                    "Trigger",
                    "Verification",
                ],
                matrix.rows.iter().map(|row| {
                    vec![
                        row.requirement.clone(),
                        row.section.clone(),
                        row.page.clone(),
                        status_label(&row.status),
                        row.owner.clone().unwrap_or_default(),
                        row.artifact.clone().unwrap_or_default(),
                        row.trigger.clone().unwrap_or_default(),
                        row.verification.clone().unwrap_or_default(),
                    ]
                }),
            )
        }),
        StageId::SectionDrafts => value.as_object().map(|drafts| {
            let mut sections: Vec<(&String, &Value)> = drafts.iter().collect();
            sections.sort_by_key(|(title, _)| outline_key(title));
            sections
                .into_iter()
                .map(|(title, draft)| render_draft(title, draft.as_str().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join("\n")
        }),
        StageId::ComplianceRedTeam => decode(value).map(|issues: Vec<RedTeamIssue>| {
            table(
                &["Section", "Finding", "Impact", "Fix", "Owner", "Artifact", "Priority"],
                issues.iter().map(|issue| {
                    vec![
                        issue.section.clone(),
                        issue.finding.clone(),
                        issue.impact.clone(),
                        issue.fix.clone(),
                        issue.owner.clone(),
                        issue.artifact.clone(),
                        status_label(&issue.priority),
                    ]
                }),
            )
        }),
        StageId::EvidencePack => decode(value).map(|pack: EvidencePack| render_evidence(&pack)),
        StageId::FactCheck => decode(value).map(|report: FactCheckReport| render_fact_check(&report)),
        _ => None,
    };
    rendered.unwrap_or_else(|| fenced_json(value))
}

fn decode<T: DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

fn fenced_json(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{pretty}\n```\n")
}

/// Serialized label of a unit enum variant (`Y`, `Partial`, `High`).
fn status_label<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(label)) => label,
        _ => String::new(),
    }
}

fn cell(text: &str) -> String {
    text.trim().replace('|', "\\|").replace('\n', "<br>")
}

fn table(headers: &[&str], rows: impl Iterator<Item = Vec<String>>) -> String {
    let mut out = format!(
        "| {} |\n|{}|\n",
        headers.join(" | "),
        vec!["---"; headers.len()].join("|")
    );
    for row in rows {
        let cells: Vec<String> = row.iter().map(String::as_str).map(cell).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

fn bullets<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let lines: Vec<String> = items.map(|item| format!("- {item}")).collect();
    if lines.is_empty() {
        "- None\n".to_string()
    } else {
        lines.join("\n") + "\n"
    }
}

/// Numeric outline prefix (`2.10 Title` -> [2, 10]); unnumbered titles last.
fn outline_key(title: &str) -> (bool, Vec<u32>, String) {
    let numbering: Vec<u32> = title
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches('.')
        .split('.')
        .map_while(|part| part.parse().ok())
        .collect();
    (numbering.is_empty(), numbering, title.to_string())
}

fn render_draft(title: &str, draft: &str) -> String {
    let draft = draft.trim();
    if draft.starts_with('#') {
        format!("{draft}\n")
    } else {
        format!("### {title}\n\n{draft}\n")
    }
}

fn render_evidence(pack: &EvidencePack) -> String {
    let mut out = format!("{}\n\n", pack.summary);
    out.push_str(&table(
        &["Artifact", "Required", "Status", "Placement", "Tags"],
        pack.artifacts.iter().map(|artifact| {
            vec![
                artifact.name.clone(),
                (if artifact.required { "Yes" } else { "No" }).to_string(),
                status_label(&artifact.status),
                artifact.placement_hint.clone(),
                artifact.evidence_tags.join(", "),
            ]
        }),
    ));
    out.push_str("\n**Gaps**\n\n");
    out.push_str(&bullets(pack.gaps.iter()));
    if !pack.insertion_map.is_empty() {
        out.push_str("\n**Insertion Map**\n\n");
        let lines: Vec<String> = pack
            .insertion_map
            .iter()
            .map(|(section, names)| format!("{section}: {}", names.join(", ")))
            .collect();
        out.push_str(&bullets(lines.iter()));
    }
    out
}

fn render_fact_check(report: &FactCheckReport) -> String {
    let mut out = format!("{}\n\n", report.summary);
    if !report.redlines.is_empty() {
        out.push_str(&table(
            &["Location", "Current", "Proposed", "Reason"],
            report.redlines.iter().map(|redline| {
                vec![
                    redline.location_hint.clone(),
                    redline.current_text.clone(),
                    redline.proposed_text.clone(),
                    redline.reason.clone(),
                ]
            }),
        ));
        out.push('\n');
    }
    out.push_str("**Citations**\n\n");
    out.push_str(&bullets(report.normalized_citations.iter()));
    out.push_str("\n**Unknown References**\n\n");
    out.push_str(&bullets(report.unknown_refs.iter()));
    out.push_str("\n**Terminology**\n\n");
    out.push_str(&bullets(report.terminology_notes.iter()));
    out
}

/// Page reference as the reply gave it: `5` or `"5"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Page {
    Number(i64),
    Text(String),
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(page) => write!(f, "{page}"),
            Self::Text(page) => f.write_str(page.trim()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Task {
    title: String,
    description: String,
    page: Page,
}

#[derive(Debug, Deserialize)]
struct Requirement {
    category: String,
    description: String,
    page: Page,
}

#[derive(Debug, Deserialize)]
struct KeyDate {
    event: String,
    date: String,
    page: Page,
}

#[derive(Debug, Deserialize)]
struct RfpAnalysis {
    customer: String,
    scope: Map<String, Value>,
    tasks: Vec<Task>,
    requirements: Vec<Requirement>,
    dates: Vec<KeyDate>,
}

impl RfpAnalysis {
    /// `text (Page n)` for the usual shape, compact JSON otherwise.
    fn scope_line(&self) -> String {
        let text = match self.scope.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => Value::Object(self.scope.clone()).to_string(),
        };
        match self.scope.get("page") {
            Some(Value::Number(page)) => format!("{text} (Page {page})"),
            Some(Value::String(page)) => format!("{text} (Page {})", page.trim()),
            _ => text,
        }
    }

    fn render(&self) -> String {
        let tasks: Vec<String> = self
            .tasks
            .iter()
            .map(|t| format!("{}: {} (Page {})", t.title, t.description, t.page))
            .collect();
        let requirements: Vec<String> = self
            .requirements
            .iter()
            .map(|r| format!("{}: {} (Page {})", r.category, r.description, r.page))
            .collect();
        let dates: Vec<String> = self
            .dates
            .iter()
            .map(|d| format!("{}: {} (Page {})", d.event, d.date, d.page))
            .collect();
        format!(
            "**Customer:** {}\n\n**Scope:** {}\n\n**Tasks**\n\n{}\n**Requirements**\n\n{}\n**Key Dates**\n\n{}",
            self.customer,
            self.scope_line(),
            bullets(tasks.iter()),
            bullets(requirements.iter()),
            bullets(dates.iter()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn succeeded(stage: StageId, title: &'static str, validated: Value) -> StageResult {
        StageResult {
            stage,
            title,
            status: StageStatus::Succeeded,
            raw_text: String::new(),
            validated,
            normalization_warnings: Vec::new(),
            attempts: 1,
            repairs: Vec::new(),
            failure: None,
        }
    }

    #[test]
    fn collapses_consecutive_duplicates() {
        assert_eq!(dedupe_consecutive_lines("A\nA\nB\nB\nB\nC"), "A\nB\nC");
    }

    #[test]
    fn duplicate_comparison_ignores_case_and_padding() {
        assert_eq!(
            dedupe_consecutive_lines("## Scope\n  ## scope  \nText\nA\nB\nA"),
            "## Scope\nText\nA\nB\nA"
        );
        assert_eq!(dedupe_consecutive_lines("x\n\n\n\ny"), "x\n\ny");
    }

    proptest! {
        #[test]
        fn dedupe_is_idempotent_and_never_adds_lines(lines in proptest::collection::vec("[ aAbB]{0,3}", 0..20)) {
            let text = lines.join("\n");
            let once = dedupe_consecutive_lines(&text);
            prop_assert_eq!(dedupe_consecutive_lines(&once), once.clone());
            prop_assert!(once.split('\n').count() <= text.split('\n').count());
            let normalized: Vec<String> = once.split('\n').map(|l| l.trim().to_lowercase()).collect();
            prop_assert!(normalized.windows(2).all(|pair| pair[0] != pair[1]));
        }
    }

    #[test]
    fn section_drafts_follow_outline_numbering() {
        let drafts = json!({
            "10. Pricing": "Price text",
            "2. Technical Approach": "## 2. Technical Approach\n\nApproach text",
            "1. Executive Summary": "Summary text",
        });
        let body = render_body(StageId::SectionDrafts, &drafts);
        let summary = body.find("Summary text").expect("summary");
        let approach = body.find("Approach text").expect("approach");
        let pricing = body.find("Price text").expect("pricing");
        assert!(summary < approach && approach < pricing);
        assert!(body.contains("### 1. Executive Summary"));
        assert!(!body.contains("### 2. Technical Approach"));
    }

    #[test]
    fn compliance_rows_render_as_table() {
        let matrix = json!({"rows": [{
            "requirement": "Encrypt | at rest",
            "section": "3.1",
            "page": "12",
            "status": "Partial",
        }]});
        let body = render_body(StageId::ComplianceMatrix, &matrix);
        assert!(body.starts_with("| Requirement | Section | Page | Status |"));
        assert!(body.contains("| Encrypt \\| at rest | 3.1 | 12 | Partial |"));
    }

    #[test]
    fn analysis_renders_summary() {
        let analysis = json!({
            "customer": "Department of Examples",
            "scope": {"text": "Modernize intake", "page": 2},
            "tasks": [{"title": "Build portal", "description": "Public intake portal", "page": 5}],
            "requirements": [],
            "dates": [{"event": "Proposals due", "date": "2026-01-15", "page": 1}],
        });
        let body = render_body(StageId::RfpAnalysis, &analysis);
        assert!(body.contains("**Customer:** Department of Examples"));
        assert!(body.contains("**Scope:** Modernize intake (Page 2)"));
        assert!(body.contains("- Build portal: Public intake portal (Page 5)"));
        assert!(body.contains("**Requirements**\n\n- None"));
    }

    #[test]
    fn analysis_tolerates_string_pages_and_free_form_scope() {
        let analysis = json!({
            "customer": "D",
            "scope": {"summary": "Intake"},
            "tasks": [{"title": "Build", "description": "Portal", "page": "5"}],
            "requirements": [],
            "dates": [],
        });
        let body = render_body(StageId::RfpAnalysis, &analysis);
        assert!(body.contains("**Scope:** {\"summary\":\"Intake\"}"));
        assert!(body.contains("- Build: Portal (Page 5)"));

        let scope = json!({"customer": "D", "scope": {"text": "x", "page": "2"},
            "tasks": [], "requirements": [], "dates": []});
        assert!(render_body(StageId::RfpAnalysis, &scope).contains("**Scope:** x (Page 2)"));
    }

    #[test]
    fn unknown_json_is_fenced() {
        let body = render_body(StageId::Classification, &json!({"domain": "US_GOV"}));
        assert!(body.starts_with("```json\n"));
        assert!(body.contains("\"domain\": \"US_GOV\""));
    }

    #[test]
    fn degraded_stage_renders_placeholder_and_artifact_is_deduped() {
        let mut degraded = succeeded(StageId::ToneReview, "Tone Review", Value::Null);
        degraded.status = StageStatus::Degraded;
        degraded.failure = Some("no valid reply after 3 attempts".to_string());
        let results = vec![
            succeeded(StageId::ProposalOutline, "Proposal Outline", json!("1. Intro\n1. Intro\n2. Scope")),
            degraded,
        ];
        let markdown = render_artifact("rfp.txt", "US_GOV", &results);
        assert!(markdown.starts_with("# Proposal Package: rfp.txt"));
        assert!(markdown.contains("1. Intro\n2. Scope"));
        assert!(markdown.contains("_Missing input: this stage did not produce a valid reply (no valid reply after 3 attempts)._"));
    }
}
