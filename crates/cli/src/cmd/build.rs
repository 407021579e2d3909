use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use fabrik_lib::execute::{ExecuteConfig, FailureCause, TargetOutcome, execute_plan};
use fabrik_lib::{StateSnapshot, compute_plan};

use crate::output::{OutputFormat, format_duration, print_error, print_json, print_stat, print_success};

pub fn cmd_build(config: &Path, targets: &[String], jobs: Option<usize>, output: OutputFormat) -> Result<i32> {
  let start = Instant::now();

  let pipeline = super::load_pipeline(config)?;
  let roots = pipeline.resolve_roots(targets)?;
  let snapshot = StateSnapshot::capture(pipeline.root(), pipeline.graph());
  let plan = compute_plan(pipeline.graph(), &snapshot, &roots)?;
  info!(roots = roots.len(), rebuild = plan.rebuild_count(), "plan computed");

  let exec = ExecuteConfig::with_jobs(jobs.unwrap_or_else(|| pipeline.jobs()));
  let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
  let report = runtime.block_on(execute_plan(
    pipeline.graph(),
    pipeline.root(),
    &plan,
    &snapshot,
    &exec,
  ))?;
  info!(
    rebuilt = report.rebuilt_count(),
    failed = report.failed_count(),
    "build finished"
  );

  if output.is_json() {
    print_json(&report)?;
    return Ok(if report.is_success() { 0 } else { 1 });
  }

  for target in &report.targets {
    match &target.outcome {
      TargetOutcome::Skipped => {}
      TargetOutcome::Rebuilt => print_success(&format!(
        "{} ({})",
        target.id,
        format_duration(Duration::from_millis(target.duration_ms))
      )),
      TargetOutcome::Failed(cause) => {
        print_error(&format!("{}: {cause}", target.id));
        if let FailureCause::Action { stderr_tail, .. } = cause
          && !stderr_tail.is_empty()
        {
          eprintln!("{stderr_tail}");
        }
      }
    }
  }

  println!();
  if report.is_success() {
    print_success("Build complete!");
  } else {
    print_error("Build failed");
  }
  print_stat("Rebuilt", &report.rebuilt_count().to_string());
  print_stat("Skipped", &report.skipped_count().to_string());
  print_stat("Failed", &report.failed_count().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(if report.is_success() { 0 } else { 1 })
}
