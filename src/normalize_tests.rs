use super::*;
use proptest::prelude::*;
use serde_json::json;

fn canonical_pack() -> Value {
    json!({
        "artifacts": [{
            "name": "SBOM",
            "required": true,
            "status": "Present",
            "placement_hint": "Section 4",
            "template_stub": "",
            "evidence_tags": ["scrm"],
        }],
        "insertion_map": {"4. Supply Chain": ["SBOM"]},
        "gaps": ["SSP: draft only"],
        "summary": "Evidence pack ready",
    })
}

#[test]
fn gap_objects_become_artifact_details_strings() {
    let out = normalize(
        NormalizerKind::EvidencePack,
        &json!({"gaps": [{"artifact": "SBOM", "details": "missing signer"}]}),
    );
    assert_eq!(out.value["gaps"], json!(["SBOM: missing signer"]));
    assert!(out
        .warnings
        .iter()
        .any(|w| w == "$.gaps[0]: object coerced to text"));
}

#[test]
fn gap_without_artifact_uses_description() {
    let out = normalize(
        NormalizerKind::EvidencePack,
        &json!({"gaps": [{"description": "no accessibility audit"}]}),
    );
    assert_eq!(out.value["gaps"], json!(["no accessibility audit"]));
}

#[test]
fn canonical_evidence_pack_is_unchanged() {
    let value = canonical_pack();
    let out = normalize(NormalizerKind::EvidencePack, &value);
    assert_eq!(out.value, value);
    assert!(out.warnings.is_empty(), "{:?}", out.warnings);
}

#[test]
fn normalizing_twice_is_stable() {
    let messy = json!({
        "artifacts": ["SBOM", {"title": "SSP", "required": "yes", "status": "draft"}],
        "insertion_map": {"2. Security": "SSP"},
        "gaps": {"artifact": "POA&M", "details": "not started"},
        "summary": {"pack": "US_GOV", "alignment": "partial"},
    });
    let once = normalize(NormalizerKind::EvidencePack, &messy);
    assert!(!once.warnings.is_empty());
    let twice = normalize(NormalizerKind::EvidencePack, &once.value);
    assert_eq!(twice.value, once.value);
    assert!(twice.warnings.is_empty(), "{:?}", twice.warnings);
}

#[test]
fn artifact_defaults_fill_missing_fields() {
    let out = normalize(NormalizerKind::EvidencePack, &json!({"artifacts": [{}]}));
    let artifact = &out.value["artifacts"][0];
    assert_eq!(artifact["name"], "Unnamed artifact");
    assert_eq!(artifact["required"], false);
    assert_eq!(artifact["status"], "Missing");
    assert_eq!(artifact["placement_hint"], "To be determined");
    assert_eq!(artifact["template_stub"], "");
    assert_eq!(artifact["evidence_tags"], json!([]));
    assert_eq!(out.value["summary"], "Evidence packaging completed");
}

#[test]
fn evidence_summary_object_is_synthesized() {
    let out = normalize(
        NormalizerKind::EvidencePack,
        &json!({
            "artifacts": [{"name": "SBOM"}],
            "gaps": ["a", "b"],
            "summary": {"pack": "US_GOV", "alignment": "strong"},
        }),
    );
    assert_eq!(
        out.value["summary"],
        "Evidence pack for US_GOV: 1 artifacts, 2 gaps. Alignment: strong"
    );
}

#[test]
fn non_object_evidence_pack_degrades_to_empty() {
    let out = normalize(NormalizerKind::EvidencePack, &json!("nothing to report"));
    assert_eq!(out.value["artifacts"], json!([]));
    assert_eq!(out.value["summary"], "Evidence packaging completed");
    assert_eq!(out.warnings.len(), 1);
}

#[test]
fn compliance_status_synonyms_map_to_canonical() {
    let out = normalize(
        NormalizerKind::ComplianceMatrix,
        &json!({"rows": [
            {"requirement": "A", "section": "1", "page": "2", "status": "yes"},
            {"requirement": "B", "section": "1", "page": "2", "status": "Partially Compliant"},
            {"requirement": "C", "section": "1", "page": "2", "status": false},
            {"requirement": "D", "section": "1", "page": "2", "status": "maybe"},
        ]}),
    );
    let statuses: Vec<&Value> = (0..4).map(|i| &out.value["rows"][i]["status"]).collect();
    assert_eq!(statuses, vec!["Y", "Partial", "N", "N"]);
    assert!(out
        .warnings
        .iter()
        .any(|w| w == "$.rows[3].status: unrecognized \"maybe\"; using \"N\""));
}

#[test]
fn compliance_aliases_and_numeric_pages() {
    let out = normalize(
        NormalizerKind::ComplianceMatrix,
        &json!([{"requirement_text": "Encrypt data", "section_ref": "3.1", "page": 14, "status": "Y"}]),
    );
    let row = &out.value["rows"][0];
    assert_eq!(row["requirement"], "Encrypt data");
    assert_eq!(row["section"], "3.1");
    assert_eq!(row["page"], "14");
    assert!(row.get("owner").is_none());
    assert!(out.warnings.iter().any(|w| w == "$: bare list read as rows"));
    assert!(out
        .warnings
        .iter()
        .any(|w| w == "$.rows[0].requirement: read from `requirement_text`"));
    assert!(out.warnings.iter().any(|w| w == "$.rows[0].page: number coerced to text"));
}

#[test]
fn unknown_row_fields_are_reported() {
    let out = normalize(
        NormalizerKind::ComplianceMatrix,
        &json!({"rows": [{"requirement": "A", "section": "1", "page": "2", "status": "Y", "color": "red"}]}),
    );
    assert_eq!(
        out.warnings,
        vec!["$.rows[0]: dropped unknown fields: color".to_string()]
    );
}

#[test]
fn red_team_issue_list_is_unwrapped() {
    let out = normalize(
        NormalizerKind::RedTeam,
        &json!({"issues": [{"finding": "No SBOM", "severity": "critical"}, "Missing 508 VPAT"]}),
    );
    assert_eq!(out.value[0]["finding"], "No SBOM");
    assert_eq!(out.value[0]["priority"], "High");
    assert_eq!(out.value[0]["owner"], "Unassigned");
    assert_eq!(out.value[1]["finding"], "Missing 508 VPAT");
    assert_eq!(out.value[1]["priority"], "Medium");
}

#[test]
fn fact_check_fields_follow_aliases() {
    let out = normalize(
        NormalizerKind::FactCheck,
        &json!({
            "normalized_citations": [{"original": "FAR 52.204-21"}],
            "redlines": [{"location": "2.1", "current_text": "shall", "proposed_text": "will"}],
            "unknown_refs": [{"reference": "NIST 800-999"}],
            "terminology_notes": [{"term": "SBOM", "content": "define on first use"}],
            "summary": {"status": "clean"},
        }),
    );
    assert_eq!(out.value["normalized_citations"], json!(["FAR 52.204-21"]));
    assert_eq!(out.value["redlines"][0]["location_hint"], "2.1");
    assert_eq!(out.value["redlines"][0]["reason"], "Validation issue");
    assert_eq!(out.value["unknown_refs"], json!(["NIST 800-999"]));
    assert_eq!(
        out.value["terminology_notes"],
        json!(["SBOM: define on first use"])
    );
    assert_eq!(out.value["summary"], "Fact-check clean");
}

#[test]
fn missing_fact_check_redline_location_uses_placeholder() {
    let out = normalize(
        NormalizerKind::FactCheck,
        &json!({"redlines": [{"proposed_text": "x"}]}),
    );
    assert_eq!(out.value["redlines"][0]["location_hint"], "Unknown location");
    assert_eq!(out.value["summary"], "Fact-check completed");
}

fn text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .]{0,12}"
}

fn canonical_row() -> impl Strategy<Value = ComplianceRow> {
    (
        text(),
        text(),
        text(),
        prop_oneof![
            Just(ComplianceStatus::Yes),
            Just(ComplianceStatus::No),
            Just(ComplianceStatus::Partial)
        ],
        proptest::option::of(text()),
    )
        .prop_map(|(requirement, section, page, status, owner)| ComplianceRow {
            requirement,
            section,
            page,
            status,
            owner,
            artifact: None,
            trigger: None,
            verification: None,
        })
}

proptest! {
    #[test]
    fn canonical_matrix_round_trips_without_warnings(rows in proptest::collection::vec(canonical_row(), 0..6)) {
        let value = serde_json::to_value(ComplianceMatrix { rows }).unwrap();
        let out = normalize(NormalizerKind::ComplianceMatrix, &value);
        prop_assert_eq!(&out.value, &value);
        prop_assert!(out.warnings.is_empty());
    }

    #[test]
    fn normalization_is_idempotent_for_arbitrary_gaps(gaps in proptest::collection::vec(
        prop_oneof![
            text().prop_map(Value::String),
            (text(), text()).prop_map(|(a, d)| json!({"artifact": a, "details": d})),
            any::<i64>().prop_map(|n| json!(n)),
            Just(Value::Null),
        ],
        0..5,
    )) {
        let once = normalize(NormalizerKind::EvidencePack, &json!({"gaps": gaps}));
        let twice = normalize(NormalizerKind::EvidencePack, &once.value);
        prop_assert_eq!(twice.value, once.value);
        prop_assert!(twice.warnings.is_empty());
    }
}
