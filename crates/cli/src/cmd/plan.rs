use std::path::Path;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use fabrik_lib::plan::{BlockedCause, Disposition};
use fabrik_lib::stale::StaleCause;
use fabrik_lib::{StateSnapshot, compute_plan};

use crate::output::{OutputFormat, print_json, print_stat, symbols};

pub fn cmd_plan(config: &Path, targets: &[String], output: OutputFormat) -> Result<i32> {
  let pipeline = super::load_pipeline(config)?;
  let roots = pipeline.resolve_roots(targets)?;
  let snapshot = StateSnapshot::capture(pipeline.root(), pipeline.graph());
  let plan = compute_plan(pipeline.graph(), &snapshot, &roots)?;

  if output.is_json() {
    print_json(&plan)?;
    return Ok(0);
  }

  for entry in &plan.entries {
    match &entry.disposition {
      Disposition::UpToDate => {
        println!(
          "{} {}",
          symbols::UP_TO_DATE.if_supports_color(Stream::Stdout, |s| s.dimmed()),
          entry.id.if_supports_color(Stream::Stdout, |s| s.dimmed())
        );
      }
      Disposition::Rebuild { cause } => {
        println!(
          "{} {}  ({})",
          symbols::REBUILD.if_supports_color(Stream::Stdout, |s| s.green()),
          entry.id,
          describe_stale(cause)
        );
      }
      Disposition::Blocked { cause } => {
        println!(
          "{} {}  ({})",
          symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
          entry.id,
          describe_blocked(cause)
        );
      }
    }
  }

  println!();
  print_stat("Rebuild", &plan.rebuild_count().to_string());
  print_stat("Up to date", &plan.up_to_date_count().to_string());
  print_stat("Blocked", &plan.blocked_count().to_string());

  Ok(0)
}

fn describe_stale(cause: &StaleCause) -> String {
  match cause {
    StaleCause::AlwaysRuns => "always runs".to_string(),
    StaleCause::OutputMissing => "output missing".to_string(),
    StaleCause::PrerequisiteNewer { prerequisite } => format!("{prerequisite} is newer"),
    StaleCause::PrerequisiteRebuilt { prerequisite } => format!("{prerequisite} will be rebuilt"),
  }
}

fn describe_blocked(cause: &BlockedCause) -> String {
  match cause {
    BlockedCause::MissingArtifact { id, hint } => match hint {
      Some(hint) => format!("{id} is missing: {hint}"),
      None => format!("{id} is missing"),
    },
    BlockedCause::StatFailed { id, message } => format!("cannot stat {id}: {message}"),
    BlockedCause::Upstream { root } => format!("blocked by {root}"),
  }
}
