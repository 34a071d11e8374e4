//! `maestro stages`: print the static stage graph.
use crate::cli::StagesArgs;
use crate::stages::{stage_catalog, StageId, StageSpec};
use crate::workflow::OutputContract;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Serialize)]
struct StageRow {
    id: StageId,
    title: &'static str,
    contract: &'static str,
    required: bool,
    pack_aware: bool,
    deps: Vec<StageId>,
    /// Top-level JSON fields (`?` marks optional) or required table columns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<String>,
}

impl From<&StageSpec> for StageRow {
    fn from(spec: &StageSpec) -> Self {
        Self {
            id: spec.id,
            title: spec.title,
            contract: spec.contract.label(),
            required: spec.required,
            pack_aware: spec.pack_aware,
            deps: spec.deps.clone(),
            fields: contract_fields(&spec.contract),
        }
    }
}

fn contract_fields(contract: &OutputContract) -> Vec<String> {
    match contract {
        OutputContract::Json(schema) => schema
            .fields()
            .into_iter()
            .map(|(name, required)| {
                if required {
                    name.to_string()
                } else {
                    format!("{name}?")
                }
            })
            .collect(),
        OutputContract::MarkdownTable { columns } => {
            columns.iter().map(|column| column.to_string()).collect()
        }
        OutputContract::Text => Vec::new(),
    }
}

pub fn run_stages(args: &StagesArgs) -> Result<()> {
    let rows: Vec<StageRow> = stage_catalog().iter().map(StageRow::from).collect();
    if args.json {
        let text = serde_json::to_string_pretty(&rows).context("serialize stage graph")?;
        println!("{text}");
        return Ok(());
    }
    for (index, row) in rows.iter().enumerate() {
        let deps: Vec<&str> = row.deps.iter().map(|dep| dep.as_str()).collect();
        println!(
            "{index:>2} {:<20} {:<14} {:<8} {}{}",
            row.id.as_str(),
            row.contract,
            if row.required { "required" } else { "optional" },
            if deps.is_empty() {
                "-".to_string()
            } else {
                deps.join(", ")
            },
            if row.pack_aware { " [pack]" } else { "" },
        );
    }
    Ok(())
}
