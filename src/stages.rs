//! Static stage graph.
//!
//! Stages are declared in dependency order; a stage may only depend on stages
//! declared before it. Each stage carries its prompt template, output
//! contract, and whether its failure halts the run.
use crate::error::PipelineError;
use crate::normalize::NormalizerKind;
use crate::schema::{ExtractionSchema, Field, SchemaNode};
use crate::workflow::OutputContract;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Classification,
    RfpAnalysis,
    ProposalOutline,
    ComplianceMatrix,
    TechnologyResearch,
    SectionDrafts,
    LanguageReview,
    ToneReview,
    ControlsMapping,
    Accessibility,
    ScrmSbom,
    ComplianceRedTeam,
    EvidencePack,
    FactCheck,
    ProposalScoring,
}

impl StageId {
    pub const ALL: [StageId; 15] = [
        Self::Classification,
        Self::RfpAnalysis,
        Self::ProposalOutline,
        Self::ComplianceMatrix,
        Self::TechnologyResearch,
        Self::SectionDrafts,
        Self::LanguageReview,
        Self::ToneReview,
        Self::ControlsMapping,
        Self::Accessibility,
        Self::ScrmSbom,
        Self::ComplianceRedTeam,
        Self::EvidencePack,
        Self::FactCheck,
        Self::ProposalScoring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::RfpAnalysis => "rfp_analysis",
            Self::ProposalOutline => "proposal_outline",
            Self::ComplianceMatrix => "compliance_matrix",
            Self::TechnologyResearch => "technology_research",
            Self::SectionDrafts => "section_drafts",
            Self::LanguageReview => "language_review",
            Self::ToneReview => "tone_review",
            Self::ControlsMapping => "controls_mapping",
            Self::Accessibility => "accessibility",
            Self::ScrmSbom => "scrm_sbom",
            Self::ComplianceRedTeam => "compliance_red_team",
            Self::EvidencePack => "evidence_pack",
            Self::FactCheck => "fact_check",
            Self::ProposalScoring => "proposal_scoring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CLASSIFICATION_PROMPT: &str = include_str!("../prompts/classification.md");
const RFP_ANALYSIS_PROMPT: &str = include_str!("../prompts/rfp_analysis.md");
const PROPOSAL_OUTLINE_PROMPT: &str = include_str!("../prompts/proposal_outline.md");
const COMPLIANCE_MATRIX_PROMPT: &str = include_str!("../prompts/compliance_matrix.md");
const TECHNOLOGY_RESEARCH_PROMPT: &str = include_str!("../prompts/technology_research.md");
const SECTION_DRAFTS_PROMPT: &str = include_str!("../prompts/section_drafts.md");
const LANGUAGE_REVIEW_PROMPT: &str = include_str!("../prompts/language_review.md");
const TONE_REVIEW_PROMPT: &str = include_str!("../prompts/tone_review.md");
const CONTROLS_MAPPING_PROMPT: &str = include_str!("../prompts/controls_mapping.md");
const ACCESSIBILITY_PROMPT: &str = include_str!("../prompts/accessibility.md");
const SCRM_SBOM_PROMPT: &str = include_str!("../prompts/scrm_sbom.md");
const COMPLIANCE_RED_TEAM_PROMPT: &str = include_str!("../prompts/compliance_red_team.md");
const EVIDENCE_PACK_PROMPT: &str = include_str!("../prompts/evidence_pack.md");
const FACT_CHECK_PROMPT: &str = include_str!("../prompts/fact_check.md");
const PROPOSAL_SCORING_PROMPT: &str = include_str!("../prompts/proposal_scoring.md");

pub const CONTROLS_COLUMNS: &[&str] = &[
    "Role",
    "Framework",
    "Control",
    "Responsibility",
    "Evidence Artifact",
];
pub const ACCESSIBILITY_COLUMNS: &[&str] = &[
    "Deliverable",
    "Test",
    "Method",
    "Pass Criteria",
    "Evidence",
    "Owner",
];
pub const SCORING_COLUMNS: &[&str] = &[
    "Section",
    "Score",
    "Strengths",
    "Weaknesses",
    "Recommendations",
];

/// One node of the stage graph.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub id: StageId,
    pub title: &'static str,
    pub deps: Vec<StageId>,
    pub contract: OutputContract,
    pub normalizer: Option<NormalizerKind>,
    pub required: bool,
    /// Receives the active profile block in its context.
    pub pack_aware: bool,
    pub instructions: &'static str,
}

impl StageSpec {
    fn new(
        id: StageId,
        title: &'static str,
        instructions: &'static str,
        contract: OutputContract,
    ) -> Self {
        Self {
            id,
            title,
            deps: Vec::new(),
            contract,
            normalizer: None,
            required: false,
            pack_aware: false,
            instructions,
        }
    }

    fn after(mut self, deps: &[StageId]) -> Self {
        self.deps = deps.to_vec();
        self
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn pack_aware(mut self) -> Self {
        self.pack_aware = true;
        self
    }

    fn normalized(mut self, kind: NormalizerKind) -> Self {
        self.normalizer = Some(kind);
        self
    }
}

fn string_list() -> SchemaNode {
    SchemaNode::array(SchemaNode::String)
}

pub fn signals_schema() -> ExtractionSchema {
    ExtractionSchema::new(
        "ClassificationSignals",
        SchemaNode::Object(vec![
            Field::optional("domain", SchemaNode::String),
            Field::optional("frameworks", string_list()),
            Field::optional("flags", string_list()),
            Field::optional("open_questions", string_list()),
        ]),
    )
}

pub fn rfp_analysis_schema() -> ExtractionSchema {
    let paged = |fields: [(&'static str, SchemaNode); 2]| {
        let mut fields: Vec<Field> = fields
            .into_iter()
            .map(|(name, node)| Field::required(name, node))
            .collect();
        fields.push(Field::required("page", SchemaNode::IntegerLike));
        SchemaNode::Object(fields)
    };
    ExtractionSchema::new(
        "RFPAnalysis",
        SchemaNode::Object(vec![
            Field::required("customer", SchemaNode::String),
            // Usually `{text, page}`, but any object is accepted.
            Field::required("scope", SchemaNode::map(SchemaNode::Any)),
            Field::required(
                "tasks",
                SchemaNode::array(paged([
                    ("title", SchemaNode::String),
                    ("description", SchemaNode::String),
                ])),
            ),
            Field::required(
                "requirements",
                SchemaNode::array(paged([
                    ("category", SchemaNode::String),
                    ("description", SchemaNode::String),
                ])),
            ),
            Field::required(
                "dates",
                SchemaNode::array(paged([
                    ("event", SchemaNode::String),
                    ("date", SchemaNode::String),
                ])),
            ),
        ]),
    )
}

/// `{rows: [...]}` is asked for; renamed row keys and bare row lists are
/// accepted and repaired by the normalizer.
fn compliance_matrix_schema() -> ExtractionSchema {
    ExtractionSchema::new(
        "ComplianceMatrix",
        SchemaNode::AnyOf(vec![
            SchemaNode::Object(vec![Field::optional(
                "rows",
                SchemaNode::array(SchemaNode::Any),
            )]),
            SchemaNode::array(SchemaNode::Any),
        ]),
    )
}

fn section_drafts_schema() -> ExtractionSchema {
    ExtractionSchema::new("SectionDrafts", SchemaNode::map(SchemaNode::String))
}

fn red_team_schema() -> ExtractionSchema {
    ExtractionSchema::new(
        "RedTeamIssues",
        SchemaNode::AnyOf(vec![
            SchemaNode::array(SchemaNode::Any),
            SchemaNode::Object(vec![
                Field::optional("issues", SchemaNode::Any),
                Field::optional("findings", SchemaNode::Any),
            ]),
        ]),
    )
}

fn evidence_pack_schema() -> ExtractionSchema {
    ExtractionSchema::new(
        "EvidencePack",
        SchemaNode::Object(vec![
            Field::optional("artifacts", SchemaNode::Any),
            Field::optional("insertion_map", SchemaNode::Any),
            Field::optional("gaps", SchemaNode::Any),
            Field::optional("summary", SchemaNode::Any),
        ]),
    )
}

fn fact_check_schema() -> ExtractionSchema {
    ExtractionSchema::new(
        "FactCheckReport",
        SchemaNode::Object(vec![
            Field::optional("normalized_citations", SchemaNode::Any),
            Field::optional("redlines", SchemaNode::Any),
            Field::optional("unknown_refs", SchemaNode::Any),
            Field::optional("terminology_notes", SchemaNode::Any),
            Field::optional("summary", SchemaNode::Any),
        ]),
    )
}

/// The full proposal graph in declaration order.
pub fn stage_catalog() -> Vec<StageSpec> {
    use StageId::*;
    let json = OutputContract::Json;
    let table = |columns: &'static [&'static str]| OutputContract::MarkdownTable { columns };
    vec![
        StageSpec::new(
            Classification,
            "Classification",
            CLASSIFICATION_PROMPT,
            json(signals_schema()),
        ),
        StageSpec::new(
            RfpAnalysis,
            "RFP Analysis",
            RFP_ANALYSIS_PROMPT,
            json(rfp_analysis_schema()),
        )
        .required(),
        StageSpec::new(
            ProposalOutline,
            "Proposal Outline",
            PROPOSAL_OUTLINE_PROMPT,
            OutputContract::Text,
        )
        .after(&[RfpAnalysis])
        .required(),
        StageSpec::new(
            ComplianceMatrix,
            "Compliance Matrix",
            COMPLIANCE_MATRIX_PROMPT,
            json(compliance_matrix_schema()),
        )
        .after(&[RfpAnalysis, ProposalOutline])
        .normalized(NormalizerKind::ComplianceMatrix)
        .required()
        .pack_aware(),
        StageSpec::new(
            TechnologyResearch,
            "Technology Research",
            TECHNOLOGY_RESEARCH_PROMPT,
            OutputContract::Text,
        )
        .after(&[RfpAnalysis]),
        StageSpec::new(
            SectionDrafts,
            "Proposal Sections",
            SECTION_DRAFTS_PROMPT,
            json(section_drafts_schema()),
        )
        .after(&[ProposalOutline, ComplianceMatrix, TechnologyResearch])
        .required()
        .pack_aware(),
        StageSpec::new(
            LanguageReview,
            "Language Review",
            LANGUAGE_REVIEW_PROMPT,
            OutputContract::Text,
        )
        .after(&[SectionDrafts]),
        StageSpec::new(
            ToneReview,
            "Tone Review",
            TONE_REVIEW_PROMPT,
            OutputContract::Text,
        )
        .after(&[SectionDrafts, LanguageReview]),
        StageSpec::new(
            ControlsMapping,
            "Controls Mapping",
            CONTROLS_MAPPING_PROMPT,
            table(CONTROLS_COLUMNS),
        )
        .after(&[RfpAnalysis, SectionDrafts])
        .pack_aware(),
        StageSpec::new(
            Accessibility,
            "Accessibility Test Plan",
            ACCESSIBILITY_PROMPT,
            table(ACCESSIBILITY_COLUMNS),
        )
        .after(&[SectionDrafts])
        .pack_aware(),
        StageSpec::new(
            ScrmSbom,
            "Supply Chain Risk Management",
            SCRM_SBOM_PROMPT,
            OutputContract::Text,
        )
        .after(&[RfpAnalysis])
        .pack_aware(),
        StageSpec::new(
            ComplianceRedTeam,
            "Compliance Red Team",
            COMPLIANCE_RED_TEAM_PROMPT,
            json(red_team_schema()),
        )
        .after(&[RfpAnalysis, ComplianceMatrix, SectionDrafts])
        .normalized(NormalizerKind::RedTeam)
        .pack_aware(),
        StageSpec::new(
            EvidencePack,
            "Evidence Pack",
            EVIDENCE_PACK_PROMPT,
            json(evidence_pack_schema()),
        )
        .after(&[ComplianceMatrix, SectionDrafts])
        .normalized(NormalizerKind::EvidencePack)
        .pack_aware(),
        StageSpec::new(
            FactCheck,
            "Fact Check",
            FACT_CHECK_PROMPT,
            json(fact_check_schema()),
        )
        .after(&[SectionDrafts])
        .normalized(NormalizerKind::FactCheck)
        .pack_aware(),
        StageSpec::new(
            ProposalScoring,
            "Proposal Scoring",
            PROPOSAL_SCORING_PROMPT,
            table(SCORING_COLUMNS),
        )
        .after(&[ComplianceMatrix, SectionDrafts])
        .pack_aware(),
    ]
}

/// Reject duplicate ids and dependencies that are unknown, self-referential
/// or declared later.
pub fn validate_graph(stages: &[StageSpec]) -> Result<(), PipelineError> {
    let mut seen = BTreeSet::new();
    for stage in stages {
        if !seen.insert(stage.id) {
            return Err(PipelineError::Graph {
                message: format!("duplicate stage {}", stage.id),
            });
        }
    }
    let mut declared = BTreeSet::new();
    for stage in stages {
        for dep in &stage.deps {
            if *dep == stage.id {
                return Err(PipelineError::Graph {
                    message: format!("stage {} depends on itself", stage.id),
                });
            }
            if !seen.contains(dep) {
                return Err(PipelineError::Graph {
                    message: format!("stage {} depends on unknown stage {dep}", stage.id),
                });
            }
            if !declared.contains(dep) {
                return Err(PipelineError::Graph {
                    message: format!("stage {} depends on later stage {dep}", stage.id),
                });
            }
        }
        declared.insert(stage.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_a_valid_graph() {
        let stages = stage_catalog();
        assert_eq!(stages.len(), StageId::ALL.len());
        validate_graph(&stages).expect("valid graph");
        let ids: Vec<StageId> = stages.iter().map(|stage| stage.id).collect();
        assert_eq!(ids, StageId::ALL.to_vec());
    }

    #[test]
    fn required_stages_form_the_core_chain() {
        let required: Vec<StageId> = stage_catalog()
            .into_iter()
            .filter(|stage| stage.required)
            .map(|stage| stage.id)
            .collect();
        assert_eq!(
            required,
            vec![
                StageId::RfpAnalysis,
                StageId::ProposalOutline,
                StageId::ComplianceMatrix,
                StageId::SectionDrafts,
            ]
        );
    }

    #[test]
    fn stage_ids_parse_case_insensitively() {
        assert_eq!(StageId::parse(" Tone_Review "), Some(StageId::ToneReview));
        assert_eq!(StageId::parse("nope"), None);
        for id in StageId::ALL {
            assert_eq!(StageId::parse(id.as_str()), Some(id));
        }
    }

    #[test]
    fn later_dependency_is_rejected() {
        let mut stages = stage_catalog();
        stages[1].deps.push(StageId::ProposalOutline);
        let err = validate_graph(&stages).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid stage graph: stage rfp_analysis depends on later stage proposal_outline"
        );
    }

    #[test]
    fn self_unknown_and_duplicate_are_rejected() {
        let mut stages = stage_catalog();
        stages[2].deps.push(StageId::ProposalOutline);
        assert!(validate_graph(&stages)
            .unwrap_err()
            .to_string()
            .contains("depends on itself"));

        let mut stages = stage_catalog();
        stages.retain(|stage| stage.id != StageId::TechnologyResearch);
        assert!(validate_graph(&stages)
            .unwrap_err()
            .to_string()
            .contains("depends on unknown stage technology_research"));

        let mut stages = stage_catalog();
        let duplicate = stages[0].clone();
        stages.push(duplicate);
        assert!(validate_graph(&stages)
            .unwrap_err()
            .to_string()
            .contains("duplicate stage classification"));
    }

    #[test]
    fn every_stage_prompt_is_present() {
        for stage in stage_catalog() {
            assert!(
                stage.instructions.starts_with("# "),
                "prompt for {} should start with a heading",
                stage.id
            );
        }
    }
}
