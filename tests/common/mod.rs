//! Shared test infrastructure for integration tests.
//!
//! The mock LM is a shell script that reads the prompt from stdin, finds the
//! `STAGE: <id>` marker line, and prints `replies/<id>.txt`. A stage without
//! a reply file makes the script exit non-zero.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const STAGE_REPLIES: &[(&str, &str)] = &[
    (
        "classification",
        r#"{"domain": "US_GOV", "frameworks": ["508"], "flags": [], "open_questions": []}"#,
    ),
    (
        "rfp_analysis",
        r#"```json
{"customer": "Department of Examples",
 "scope": {"text": "Modernize benefits intake", "page": 2},
 "tasks": [{"title": "Build portal", "description": "Public intake portal", "page": 5}],
 "requirements": [{"category": "Security", "description": "FIPS 140-3 validated encryption", "page": 7}],
 "dates": [{"event": "Proposals due", "date": "2026-01-15", "page": 1}]}
```"#,
    ),
    (
        "proposal_outline",
        "1. Executive Summary\n2. Technical Approach\n3. Management Plan",
    ),
    (
        "compliance_matrix",
        r#"{"rows": [{"requirement": "FIPS 140-3 validated encryption", "section": "2", "page": 7, "status": "yes"}]}"#,
    ),
    ("technology_research", "Managed Postgres with FIPS endpoints."),
    (
        "section_drafts",
        r#"{"1. Executive Summary": "We deliver the portal.", "2. Technical Approach": "We encrypt everything.", "3. Management Plan": "Agile delivery."}"#,
    ),
    ("language_review", "No issues found."),
    ("tone_review", "Voice is consistent."),
    (
        "controls_mapping",
        "| Role | Framework | Control | Responsibility | Evidence Artifact |\n|---|---|---|---|---|\n| ISSO | NIST_800_53 | SC-13 | Cryptographic protection | SSP |",
    ),
    (
        "accessibility",
        "| Deliverable | Test | Method | Pass Criteria | Evidence | Owner |\n|---|---|---|---|---|---|\n| Portal | Keyboard | Manual | No traps | VPAT | QA |",
    ),
    ("scrm_sbom", "SPDX SBOM delivered with every release."),
    (
        "compliance_red_team",
        r#"[{"section": "2", "finding": "No CMVP certificate number", "impact": "Evaluator doubt", "fix": "Cite certificate", "owner": "ISSO", "artifact": "CMVP cert", "priority": "High"}]"#,
    ),
    (
        "evidence_pack",
        r#"{"artifacts": [{"name": "SSP", "required": true, "status": "Present"}], "gaps": [], "summary": "Evidence ready"}"#,
    ),
    (
        "fact_check",
        r#"{"normalized_citations": [], "redlines": [], "unknown_refs": [], "terminology_notes": [], "summary": "clean"}"#,
    ),
    (
        "proposal_scoring",
        "| Section | Score | Strengths | Weaknesses | Recommendations |\n|---|---|---|---|---|\n| 2 | 88 | Clear | Thin metrics | Add KPIs |",
    ),
];

pub const RFP_TEXT: &str = "The Department of Examples requests proposals for a benefits \
intake portal. Offerors shall use FIPS 140-3 validated encryption and meet Section 508.";

/// Temp workspace holding the mock LM, its replies, and run outputs.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    /// Workspace whose mock LM answers every stage except `missing`.
    pub fn new(missing: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let replies = dir.path().join("replies");
        fs::create_dir_all(&replies).expect("create replies dir");
        for (stage, reply) in STAGE_REPLIES {
            if missing.contains(stage) {
                continue;
            }
            fs::write(replies.join(format!("{stage}.txt")), reply).expect("write reply");
        }
        let script = format!(
            "#!/bin/sh\nstage=$(sed -n 's/^STAGE: //p' | head -n 1)\nreply=\"{}/$stage.txt\"\n\
             if [ -f \"$reply\" ]; then cat \"$reply\"; else echo \"no reply for $stage\" >&2; exit 1; fi\n",
            replies.display()
        );
        let lm = dir.path().join("mock-lm.sh");
        fs::write(&lm, script).expect("write mock lm");
        fs::set_permissions(&lm, fs::Permissions::from_mode(0o755)).expect("chmod mock lm");
        fs::write(dir.path().join("agency_rfp.txt"), RFP_TEXT).expect("write rfp");
        Self { dir }
    }

    /// Mock LM that fails at once when the prompt contains `marker` and
    /// otherwise answers like [`Workspace::lm`] after `delay` seconds.
    pub fn gated_lm(&self, marker: &str, delay: &str) -> PathBuf {
        let script = format!(
            "#!/bin/sh\nprompt=$(cat)\n\
             if printf '%s' \"$prompt\" | grep -q '{marker}'; then echo \"gated\" >&2; exit 1; fi\n\
             sleep {delay}\n\
             printf '%s\\n' \"$prompt\" | {}\n",
            self.lm().display()
        );
        let lm = self.path().join("gated-lm.sh");
        fs::write(&lm, script).expect("write gated lm");
        fs::set_permissions(&lm, fs::Permissions::from_mode(0o755)).expect("chmod gated lm");
        lm
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn lm(&self) -> PathBuf {
        self.path().join("mock-lm.sh")
    }

    pub fn rfp(&self) -> PathBuf {
        self.path().join("agency_rfp.txt")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    /// Run `maestro` in the workspace with a clean provider environment.
    pub fn maestro(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_maestro"))
            .args(args)
            .current_dir(self.path())
            .env_remove("MAESTRO_LM_COMMAND")
            .env_remove("DEFAULT_POLICY_PACK")
            .env_remove("RUST_LOG")
            .output()
            .expect("run maestro")
    }

    /// Output files whose names start with `prefix`.
    pub fn outputs(&self, prefix: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.out_dir()) else {
            return Vec::new();
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(prefix))
            })
            .collect();
        found.sort();
        found
    }
}
