//! Post-validation coercion of loosely-typed replies.
//!
//! Schemas for these stages are deliberately permissive; this module maps the
//! shapes providers actually emit (strings where records are expected, records
//! where lists are expected, renamed fields) onto one canonical record type per
//! stage. Every shape change is recorded as a warning. Unusable values degrade
//! to named placeholders instead of failing the stage.
//!
//! Already-canonical input passes through unchanged with no warnings.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Which canonical record family a stage's reply is normalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizerKind {
    ComplianceMatrix,
    RedTeam,
    EvidencePack,
    FactCheck,
}

/// Canonical value plus the coercions applied to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub value: Value,
    pub warnings: Vec<String>,
}

pub fn normalize(kind: NormalizerKind, value: &Value) -> Normalized {
    let mut warnings = Warnings::default();
    let root = Loose::of(Some(value));
    let value = match kind {
        NormalizerKind::ComplianceMatrix => to_value(compliance_matrix(root, &mut warnings)),
        NormalizerKind::RedTeam => to_value(red_team(root, &mut warnings)),
        NormalizerKind::EvidencePack => to_value(evidence_pack(root, &mut warnings)),
        NormalizerKind::FactCheck => to_value(fact_check(root, &mut warnings)),
    };
    Normalized {
        value,
        warnings: warnings.0,
    }
}

fn to_value<T: Serialize>(record: T) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

// ============================================================================
// Canonical records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
    Partial,
}

/// One requirement mapped to the section that answers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRow {
    pub requirement: String,
    pub section: String,
    pub page: String,
    pub status: ComplianceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceMatrix {
    pub rows: Vec<ComplianceRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedTeamIssue {
    pub section: String,
    pub finding: String,
    pub impact: String,
    pub fix: String,
    pub owner: String,
    pub artifact: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactStatus {
    Present,
    Missing,
    Placeholder,
}

/// Evidence artifact descriptor with a suggested placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub required: bool,
    pub status: ArtifactStatus,
    pub placement_hint: String,
    pub template_stub: String,
    pub evidence_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub artifacts: Vec<ArtifactEntry>,
    pub insertion_map: BTreeMap<String, Vec<String>>,
    pub gaps: Vec<String>,
    pub summary: String,
}

/// Proposed minimal text replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redline {
    pub location_hint: String,
    pub current_text: String,
    pub proposed_text: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCheckReport {
    pub normalized_citations: Vec<String>,
    pub redlines: Vec<Redline>,
    pub unknown_refs: Vec<String>,
    pub terminology_notes: Vec<String>,
    pub summary: String,
}

// ============================================================================
// Tagged view of untrusted values
// ============================================================================

/// Shape of one reply value, decoded once so coercion rules can match on it.
#[derive(Debug, Clone, Copy)]
pub enum Loose<'a> {
    Missing,
    Null,
    Text(&'a str),
    Flag(bool),
    Number(&'a Number),
    List(&'a [Value]),
    Record(&'a Map<String, Value>),
}

impl<'a> Loose<'a> {
    pub fn of(value: Option<&'a Value>) -> Self {
        match value {
            None => Self::Missing,
            Some(Value::Null) => Self::Null,
            Some(Value::String(text)) => Self::Text(text),
            Some(Value::Bool(flag)) => Self::Flag(*flag),
            Some(Value::Number(number)) => Self::Number(number),
            Some(Value::Array(items)) => Self::List(items),
            Some(Value::Object(map)) => Self::Record(map),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Missing => "missing value",
            Self::Null => "null",
            Self::Text(_) => "string",
            Self::Flag(_) => "boolean",
            Self::Number(_) => "number",
            Self::List(_) => "list",
            Self::Record(_) => "object",
        }
    }
}

#[derive(Debug, Default)]
struct Warnings(Vec<String>);

impl Warnings {
    fn push(&mut self, path: &str, message: impl Into<String>) {
        self.0.push(format!("{path}: {}", message.into()));
    }
}

/// How to turn any shape into the canonical string for one field.
#[derive(Debug, Clone, Copy)]
pub struct TextRule {
    /// Sub-keys naming the subject of a record (`artifact`, `term`).
    pub label_keys: &'static [&'static str],
    /// Sub-keys holding the primary text of a record.
    pub detail_keys: &'static [&'static str],
    pub fallback: &'static str,
}

impl TextRule {
    pub const fn plain(fallback: &'static str) -> Self {
        Self {
            label_keys: &[],
            detail_keys: &["text", "value", "name", "description"],
            fallback,
        }
    }

    fn coerce(&self, loose: Loose<'_>, path: &str, warnings: &mut Warnings) -> String {
        match loose {
            Loose::Text(text) => text.to_string(),
            Loose::Missing | Loose::Null => {
                warnings.push(path, format!("{}; using \"{}\"", loose.kind(), self.fallback));
                self.fallback.to_string()
            }
            Loose::Flag(flag) => {
                warnings.push(path, "boolean coerced to text");
                flag.to_string()
            }
            Loose::Number(number) => {
                warnings.push(path, "number coerced to text");
                number.to_string()
            }
            Loose::Record(map) => {
                let label = first_text(map, self.label_keys);
                let detail = first_text(map, self.detail_keys);
                match (label, detail) {
                    (Some(label), Some(detail)) => {
                        warnings.push(path, "object coerced to text");
                        format!("{label}: {detail}")
                    }
                    (Some(text), None) | (None, Some(text)) => {
                        warnings.push(path, "object coerced to text");
                        text.to_string()
                    }
                    (None, None) => {
                        warnings.push(
                            path,
                            format!("unrecognized object; using \"{}\"", self.fallback),
                        );
                        self.fallback.to_string()
                    }
                }
            }
            Loose::List(items) => {
                let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                if parts.is_empty() {
                    warnings.push(
                        path,
                        format!("unrecognized list; using \"{}\"", self.fallback),
                    );
                    return self.fallback.to_string();
                }
                warnings.push(path, "list joined into text");
                parts.join("; ")
            }
        }
    }
}

fn first_text<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())
}

fn optional_text(
    loose: Loose<'_>,
    rule: &TextRule,
    path: &str,
    warnings: &mut Warnings,
) -> Option<String> {
    match loose {
        Loose::Missing => None,
        Loose::Null => {
            warnings.push(path, "null dropped");
            None
        }
        other => Some(rule.coerce(other, path, warnings)),
    }
}

fn text_list(
    loose: Loose<'_>,
    rule: &TextRule,
    path: &str,
    warnings: &mut Warnings,
) -> Vec<String> {
    record_list(loose, path, warnings, |item, item_path, warnings| {
        rule.coerce(item, item_path, warnings)
    })
}

/// Apply `each` to every element, wrapping a lone non-list value.
fn record_list<T>(
    loose: Loose<'_>,
    path: &str,
    warnings: &mut Warnings,
    mut each: impl FnMut(Loose<'_>, &str, &mut Warnings) -> T,
) -> Vec<T> {
    match loose {
        Loose::List(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| each(Loose::of(Some(item)), &format!("{path}[{idx}]"), warnings))
            .collect(),
        Loose::Missing | Loose::Null => {
            warnings.push(path, format!("{}; using empty list", loose.kind()));
            Vec::new()
        }
        other => {
            warnings.push(path, format!("{} wrapped in a list", other.kind()));
            vec![each(other, &format!("{path}[0]"), warnings)]
        }
    }
}

fn flag(loose: Loose<'_>, fallback: bool, path: &str, warnings: &mut Warnings) -> bool {
    let parsed = match loose {
        Loose::Flag(flag) => return flag,
        Loose::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "required" => Some(true),
            "false" | "no" | "n" | "optional" => Some(false),
            _ => None,
        },
        Loose::Number(number) => number.as_f64().map(|n| n != 0.0),
        _ => None,
    };
    match parsed {
        Some(value) => {
            warnings.push(path, format!("{} read as boolean {value}", loose.kind()));
            value
        }
        None => {
            warnings.push(
                path,
                format!("{} is not a boolean; using {fallback}", loose.kind()),
            );
            fallback
        }
    }
}

/// Closed set of canonical labels with accepted synonyms.
trait Vocabulary: Copy + Sized {
    const FALLBACK: Self;
    fn label(self) -> &'static str;
    fn from_synonym(normalized: &str) -> Option<Self>;
    fn from_flag(_flag: bool) -> Option<Self> {
        None
    }
}

fn vocabulary<T: Vocabulary>(loose: Loose<'_>, path: &str, warnings: &mut Warnings) -> T {
    let fallback = T::FALLBACK.label();
    match loose {
        Loose::Text(raw) => {
            let key = raw.trim().to_ascii_lowercase().replace(['-', '_'], " ");
            match T::from_synonym(&key) {
                Some(value) => {
                    if value.label() != raw {
                        warnings.push(path, format!("\"{raw}\" read as \"{}\"", value.label()));
                    }
                    value
                }
                None => {
                    warnings.push(path, format!("unrecognized \"{raw}\"; using \"{fallback}\""));
                    T::FALLBACK
                }
            }
        }
        Loose::Flag(flag) => match T::from_flag(flag) {
            Some(value) => {
                warnings.push(path, format!("boolean read as \"{}\"", value.label()));
                value
            }
            None => {
                warnings.push(path, format!("boolean not accepted; using \"{fallback}\""));
                T::FALLBACK
            }
        },
        other => {
            warnings.push(path, format!("{}; using \"{fallback}\"", other.kind()));
            T::FALLBACK
        }
    }
}

impl Vocabulary for ComplianceStatus {
    const FALLBACK: Self = Self::No;

    fn label(self) -> &'static str {
        match self {
            Self::Yes => "Y",
            Self::No => "N",
            Self::Partial => "Partial",
        }
    }

    fn from_synonym(normalized: &str) -> Option<Self> {
        match normalized {
            "y" | "yes" | "compliant" | "met" | "complete" | "true" => Some(Self::Yes),
            "n" | "no" | "non compliant" | "noncompliant" | "not met" | "false" => Some(Self::No),
            "partial" | "partially" | "partially compliant" | "partially met" => {
                Some(Self::Partial)
            }
            _ => None,
        }
    }

    fn from_flag(flag: bool) -> Option<Self> {
        Some(if flag { Self::Yes } else { Self::No })
    }
}

impl Vocabulary for Priority {
    const FALLBACK: Self = Self::Medium;

    fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    fn from_synonym(normalized: &str) -> Option<Self> {
        match normalized {
            "high" | "critical" | "p1" | "p0" | "major" => Some(Self::High),
            "medium" | "med" | "moderate" | "p2" => Some(Self::Medium),
            "low" | "minor" | "p3" | "info" => Some(Self::Low),
            _ => None,
        }
    }
}

impl Vocabulary for ArtifactStatus {
    const FALLBACK: Self = Self::Missing;

    fn label(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Missing => "Missing",
            Self::Placeholder => "Placeholder",
        }
    }

    fn from_synonym(normalized: &str) -> Option<Self> {
        match normalized {
            "present" | "available" | "complete" | "done" | "exists" => Some(Self::Present),
            "missing" | "absent" | "todo" | "not present" => Some(Self::Missing),
            "placeholder" | "draft" | "partial" | "stub" => Some(Self::Placeholder),
            _ => None,
        }
    }
}

/// Field access over one reply object, tracking which keys were consumed.
struct RecordView<'a> {
    map: &'a Map<String, Value>,
    path: String,
    consumed: Vec<&'a str>,
}

impl<'a> RecordView<'a> {
    fn new(map: &'a Map<String, Value>, path: &str) -> Self {
        Self {
            map,
            path: path.to_string(),
            consumed: Vec::new(),
        }
    }

    fn child(&self, name: &str) -> String {
        format!("{}.{name}", self.path)
    }

    fn field(
        &mut self,
        canonical: &'static str,
        aliases: &[&'static str],
        warnings: &mut Warnings,
    ) -> Loose<'a> {
        if let Some(value) = self.map.get(canonical) {
            self.consumed.push(canonical);
            return Loose::of(Some(value));
        }
        for alias in aliases {
            if let Some(value) = self.map.get(*alias) {
                self.consumed.push(*alias);
                warnings.push(&self.child(canonical), format!("read from `{alias}`"));
                return Loose::of(Some(value));
            }
        }
        Loose::Missing
    }

    fn finish(self, warnings: &mut Warnings) {
        let unknown: Vec<&str> = self
            .map
            .keys()
            .map(String::as_str)
            .filter(|key| !self.consumed.contains(key))
            .collect();
        if !unknown.is_empty() {
            warnings.push(
                &self.path,
                format!("dropped unknown fields: {}", unknown.join(", ")),
            );
        }
    }
}

// ============================================================================
// Compliance matrix
// ============================================================================

const REQUIREMENT_FALLBACK: &str = "Unspecified requirement";

fn compliance_matrix(root: Loose<'_>, warnings: &mut Warnings) -> ComplianceMatrix {
    let rows = match root {
        Loose::Record(map) => {
            let mut view = RecordView::new(map, "$");
            let rows = view.field("rows", &["compliance_matrix", "matrix", "items"], warnings);
            view.finish(warnings);
            rows
        }
        Loose::List(_) => {
            warnings.push("$", "bare list read as rows");
            root
        }
        other => {
            warnings.push("$", format!("{} has no rows", other.kind()));
            Loose::Missing
        }
    };
    ComplianceMatrix {
        rows: record_list(rows, "$.rows", warnings, compliance_row),
    }
}

fn compliance_row(loose: Loose<'_>, path: &str, warnings: &mut Warnings) -> ComplianceRow {
    let map = match loose {
        Loose::Record(map) => map,
        Loose::Text(text) => {
            warnings.push(path, "string read as requirement text");
            return placeholder_row(text);
        }
        other => {
            warnings.push(path, format!("{} replaced by placeholder row", other.kind()));
            return placeholder_row(REQUIREMENT_FALLBACK);
        }
    };
    let mut view = RecordView::new(map, path);
    let requirement = view.field(
        "requirement",
        &["requirement_text", "description", "req"],
        warnings,
    );
    let requirement =
        TextRule::plain(REQUIREMENT_FALLBACK).coerce(requirement, &view.child("requirement"), warnings);
    let section = view.field("section", &["section_ref", "rfp_section"], warnings);
    let section = TextRule::plain("Unmapped").coerce(section, &view.child("section"), warnings);
    let page = view.field("page", &["page_ref", "pages"], warnings);
    let page = TextRule::plain("N/A").coerce(page, &view.child("page"), warnings);
    let status = view.field("status", &["compliance_status", "compliant"], warnings);
    let status = vocabulary(status, &view.child("status"), warnings);

    let optional = |name: &'static str, view: &mut RecordView<'_>, warnings: &mut Warnings| {
        let loose = view.field(name, &[], warnings);
        optional_text(loose, &TextRule::plain(""), &view.child(name), warnings)
    };
    let owner = optional("owner", &mut view, warnings);
    let artifact = optional("artifact", &mut view, warnings);
    let trigger = optional("trigger", &mut view, warnings);
    let verification = optional("verification", &mut view, warnings);
    view.finish(warnings);

    ComplianceRow {
        requirement,
        section,
        page,
        status,
        owner,
        artifact,
        trigger,
        verification,
    }
}

fn placeholder_row(requirement: &str) -> ComplianceRow {
    ComplianceRow {
        requirement: requirement.to_string(),
        section: "Unmapped".to_string(),
        page: "N/A".to_string(),
        status: ComplianceStatus::FALLBACK,
        owner: None,
        artifact: None,
        trigger: None,
        verification: None,
    }
}

// ============================================================================
// Compliance red team
// ============================================================================

fn red_team(root: Loose<'_>, warnings: &mut Warnings) -> Vec<RedTeamIssue> {
    let issues = match root {
        Loose::List(_) => root,
        Loose::Record(map) if map.contains_key("issues") || map.contains_key("findings") => {
            let mut view = RecordView::new(map, "$");
            let issues = view.field("issues", &["findings"], warnings);
            view.finish(warnings);
            warnings.push("$", "issue list unwrapped from object");
            issues
        }
        other => other,
    };
    record_list(issues, "$", warnings, red_team_issue)
}

fn red_team_issue(loose: Loose<'_>, path: &str, warnings: &mut Warnings) -> RedTeamIssue {
    let map = match loose {
        Loose::Record(map) => map,
        Loose::Text(text) => {
            warnings.push(path, "string read as finding");
            return placeholder_issue(text);
        }
        other => {
            warnings.push(path, format!("{} replaced by placeholder issue", other.kind()));
            return placeholder_issue("Unspecified finding");
        }
    };
    let mut view = RecordView::new(map, path);
    let text = |name: &'static str,
                    aliases: &[&'static str],
                    fallback: &'static str,
                    view: &mut RecordView<'_>,
                    warnings: &mut Warnings| {
        let loose = view.field(name, aliases, warnings);
        TextRule::plain(fallback).coerce(loose, &view.child(name), warnings)
    };
    let section = text("section", &["location", "section_ref"], "General", &mut view, warnings);
    let finding = text(
        "finding",
        &["issue", "problem", "description"],
        "Unspecified finding",
        &mut view,
        warnings,
    );
    let impact = text("impact", &[], "", &mut view, warnings);
    let fix = text("fix", &["recommendation", "remediation"], "", &mut view, warnings);
    let owner = text("owner", &[], "Unassigned", &mut view, warnings);
    let artifact = text("artifact", &[], "", &mut view, warnings);
    let priority = view.field("priority", &["severity"], warnings);
    let priority = vocabulary(priority, &view.child("priority"), warnings);
    view.finish(warnings);

    RedTeamIssue {
        section,
        finding,
        impact,
        fix,
        owner,
        artifact,
        priority,
    }
}

fn placeholder_issue(finding: &str) -> RedTeamIssue {
    RedTeamIssue {
        section: "General".to_string(),
        finding: finding.to_string(),
        impact: String::new(),
        fix: String::new(),
        owner: "Unassigned".to_string(),
        artifact: String::new(),
        priority: Priority::FALLBACK,
    }
}

// ============================================================================
// Evidence pack
// ============================================================================

const UNNAMED_ARTIFACT: &str = "Unnamed artifact";
const EVIDENCE_SUMMARY_FALLBACK: &str = "Evidence packaging completed";

const GAP: TextRule = TextRule {
    label_keys: &["artifact", "name"],
    detail_keys: &["details", "description", "gap"],
    fallback: "Unspecified gap",
};
const TAG: TextRule = TextRule {
    label_keys: &[],
    detail_keys: &["tag", "name"],
    fallback: "untagged",
};
const ARTIFACT_REF: TextRule = TextRule {
    label_keys: &[],
    detail_keys: &["name", "artifact", "title"],
    fallback: UNNAMED_ARTIFACT,
};

fn evidence_pack(root: Loose<'_>, warnings: &mut Warnings) -> EvidencePack {
    let Loose::Record(map) = root else {
        warnings.push("$", format!("{} replaced by empty evidence pack", root.kind()));
        return EvidencePack {
            artifacts: Vec::new(),
            insertion_map: BTreeMap::new(),
            gaps: Vec::new(),
            summary: EVIDENCE_SUMMARY_FALLBACK.to_string(),
        };
    };
    let mut view = RecordView::new(map, "$");
    let artifacts = view.field("artifacts", &[], warnings);
    let artifacts = record_list(artifacts, "$.artifacts", warnings, artifact_entry);
    let insertion = view.field("insertion_map", &["insertions"], warnings);
    let insertion_map = insertion_map(insertion, "$.insertion_map", warnings);
    let gaps = view.field("gaps", &[], warnings);
    let gaps = text_list(gaps, &GAP, "$.gaps", warnings);
    let summary = view.field("summary", &[], warnings);
    let (artifact_count, gap_count) = (artifacts.len(), gaps.len());
    let summary = summary_text(
        summary,
        "$.summary",
        EVIDENCE_SUMMARY_FALLBACK,
        warnings,
        |map| {
            let pack = first_text(map, &["pack", "profile"]);
            let alignment = first_text(map, &["alignment"]);
            if pack.is_none() && alignment.is_none() {
                return None;
            }
            let mut text = format!(
                "Evidence pack for {}: {artifact_count} artifacts, {gap_count} gaps.",
                pack.unwrap_or("the active profile")
            );
            if let Some(alignment) = alignment {
                text.push_str(&format!(" Alignment: {alignment}"));
            }
            Some(text)
        },
    );
    view.finish(warnings);

    EvidencePack {
        artifacts,
        insertion_map,
        gaps,
        summary,
    }
}

fn artifact_entry(loose: Loose<'_>, path: &str, warnings: &mut Warnings) -> ArtifactEntry {
    let map = match loose {
        Loose::Record(map) => map,
        Loose::Text(name) => {
            warnings.push(path, "string read as artifact name");
            return placeholder_artifact(name);
        }
        other => {
            warnings.push(path, format!("{} replaced by placeholder artifact", other.kind()));
            return placeholder_artifact(UNNAMED_ARTIFACT);
        }
    };
    let mut view = RecordView::new(map, path);
    let name = view.field("name", &["artifact", "title"], warnings);
    let name = TextRule::plain(UNNAMED_ARTIFACT).coerce(name, &view.child("name"), warnings);
    let required = view.field("required", &["mandatory"], warnings);
    let required = flag(required, false, &view.child("required"), warnings);
    let status = view.field("status", &[], warnings);
    let status = vocabulary(status, &view.child("status"), warnings);
    let hint = view.field("placement_hint", &["placement", "location"], warnings);
    let placement_hint =
        TextRule::plain("To be determined").coerce(hint, &view.child("placement_hint"), warnings);
    let stub = view.field("template_stub", &["template"], warnings);
    let template_stub = TextRule::plain("").coerce(stub, &view.child("template_stub"), warnings);
    let tags = view.field("evidence_tags", &["tags"], warnings);
    let evidence_tags = text_list(tags, &TAG, &view.child("evidence_tags"), warnings);
    view.finish(warnings);

    ArtifactEntry {
        name,
        required,
        status,
        placement_hint,
        template_stub,
        evidence_tags,
    }
}

fn placeholder_artifact(name: &str) -> ArtifactEntry {
    ArtifactEntry {
        name: name.to_string(),
        required: false,
        status: ArtifactStatus::FALLBACK,
        placement_hint: "To be determined".to_string(),
        template_stub: String::new(),
        evidence_tags: Vec::new(),
    }
}

fn insertion_map(
    loose: Loose<'_>,
    path: &str,
    warnings: &mut Warnings,
) -> BTreeMap<String, Vec<String>> {
    match loose {
        Loose::Record(map) => map
            .iter()
            .map(|(section, value)| {
                let names = text_list(
                    Loose::of(Some(value)),
                    &ARTIFACT_REF,
                    &format!("{path}.{section}"),
                    warnings,
                );
                (section.clone(), names)
            })
            .collect(),
        other => {
            warnings.push(path, format!("{}; using empty map", other.kind()));
            BTreeMap::new()
        }
    }
}

/// Canonical summary string; records use a direct text key or `synthesize`.
fn summary_text(
    loose: Loose<'_>,
    path: &str,
    fallback: &'static str,
    warnings: &mut Warnings,
    synthesize: impl FnOnce(&Map<String, Value>) -> Option<String>,
) -> String {
    let Loose::Record(map) = loose else {
        return TextRule::plain(fallback).coerce(loose, path, warnings);
    };
    if let Some(text) = first_text(map, &["text", "overview", "summary"]) {
        warnings.push(path, "object coerced to text");
        return text.to_string();
    }
    match synthesize(map) {
        Some(text) => {
            warnings.push(path, "summary synthesized from object");
            text
        }
        None => {
            warnings.push(path, format!("unrecognized object; using \"{fallback}\""));
            fallback.to_string()
        }
    }
}

// ============================================================================
// Fact check
// ============================================================================

const FACT_CHECK_SUMMARY_FALLBACK: &str = "Fact-check completed";

const CITATION: TextRule = TextRule {
    label_keys: &[],
    detail_keys: &["original", "citation", "normalized", "text"],
    fallback: "Unspecified citation",
};
const UNKNOWN_REF: TextRule = TextRule {
    label_keys: &[],
    detail_keys: &["reference", "ref", "text"],
    fallback: "Unspecified reference",
};
const TERM_NOTE: TextRule = TextRule {
    label_keys: &["term"],
    detail_keys: &["note", "content", "text"],
    fallback: "Unspecified note",
};

fn fact_check(root: Loose<'_>, warnings: &mut Warnings) -> FactCheckReport {
    let Loose::Record(map) = root else {
        warnings.push("$", format!("{} replaced by empty report", root.kind()));
        return FactCheckReport {
            normalized_citations: Vec::new(),
            redlines: Vec::new(),
            unknown_refs: Vec::new(),
            terminology_notes: Vec::new(),
            summary: FACT_CHECK_SUMMARY_FALLBACK.to_string(),
        };
    };
    let mut view = RecordView::new(map, "$");
    let citations = view.field("normalized_citations", &["citations"], warnings);
    let normalized_citations = text_list(citations, &CITATION, "$.normalized_citations", warnings);
    let redlines = view.field("redlines", &["edits"], warnings);
    let redlines = record_list(redlines, "$.redlines", warnings, redline);
    let refs = view.field("unknown_refs", &["unknown_references"], warnings);
    let unknown_refs = text_list(refs, &UNKNOWN_REF, "$.unknown_refs", warnings);
    let notes = view.field("terminology_notes", &["terminology"], warnings);
    let terminology_notes = text_list(notes, &TERM_NOTE, "$.terminology_notes", warnings);
    let summary = view.field("summary", &[], warnings);
    let summary = summary_text(
        summary,
        "$.summary",
        FACT_CHECK_SUMMARY_FALLBACK,
        warnings,
        |map| {
            let status = first_text(map, &["status", "result"])?;
            Some(match first_text(map, &["notes", "details"]) {
                Some(notes) => format!("Fact-check {status}: {notes}"),
                None => format!("Fact-check {status}"),
            })
        },
    );
    view.finish(warnings);

    FactCheckReport {
        normalized_citations,
        redlines,
        unknown_refs,
        terminology_notes,
        summary,
    }
}

fn redline(loose: Loose<'_>, path: &str, warnings: &mut Warnings) -> Redline {
    let map = match loose {
        Loose::Record(map) => map,
        Loose::Text(text) => {
            warnings.push(path, "string read as proposed text");
            return placeholder_redline(text);
        }
        other => {
            warnings.push(path, format!("{} replaced by placeholder redline", other.kind()));
            return placeholder_redline("");
        }
    };
    let mut view = RecordView::new(map, path);
    let location = view.field("location_hint", &["location", "section"], warnings);
    let location_hint =
        TextRule::plain("Unknown location").coerce(location, &view.child("location_hint"), warnings);
    let current = view.field("current_text", &["current", "original"], warnings);
    let current_text = TextRule::plain("").coerce(current, &view.child("current_text"), warnings);
    let proposed = view.field("proposed_text", &["proposed", "replacement"], warnings);
    let proposed_text =
        TextRule::plain("").coerce(proposed, &view.child("proposed_text"), warnings);
    let reason = view.field("reason", &["rationale"], warnings);
    let reason = TextRule::plain("Validation issue").coerce(reason, &view.child("reason"), warnings);
    view.finish(warnings);

    Redline {
        location_hint,
        current_text,
        proposed_text,
        reason,
    }
}

fn placeholder_redline(proposed: &str) -> Redline {
    Redline {
        location_hint: "Unknown location".to_string(),
        current_text: String::new(),
        proposed_text: proposed.to_string(),
        reason: "Validation issue".to_string(),
    }
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
