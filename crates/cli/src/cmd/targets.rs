use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use fabrik_lib::{StateSnapshot, TargetKind};

use crate::output::{OutputFormat, print_json};

#[derive(Serialize)]
struct TargetRow {
  id: String,
  kind: &'static str,
  provenance: String,
  state: &'static str,
}

pub fn cmd_targets(config: &Path, output: OutputFormat) -> Result<i32> {
  let pipeline = super::load_pipeline(config)?;
  let snapshot = StateSnapshot::capture(pipeline.root(), pipeline.graph());

  let rows: Vec<TargetRow> = pipeline
    .graph()
    .targets()
    .iter()
    .map(|target| TargetRow {
      id: target.id.to_string(),
      kind: match target.kind {
        TargetKind::Real => "real",
        TargetKind::Phony => "phony",
      },
      provenance: target.provenance.to_string(),
      state: match target.kind {
        TargetKind::Phony => "-",
        TargetKind::Real if snapshot.exists(&target.id) => "present",
        TargetKind::Real => "absent",
      },
    })
    .collect();

  if output.is_json() {
    print_json(&rows)?;
    return Ok(0);
  }

  for row in &rows {
    println!("{:<5} {:<7} {:<14} {}", row.kind, row.state, row.provenance, row.id);
  }

  Ok(0)
}
