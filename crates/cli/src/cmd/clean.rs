use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use fabrik_lib::{CleanOptions, clean};

use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success};

pub fn cmd_clean(config: &Path, rule: Option<String>, dry_run: bool, output: OutputFormat) -> Result<i32> {
  let start = Instant::now();

  let pipeline = super::load_pipeline(config)?;
  let report = clean(&pipeline, &CleanOptions { rule, dry_run })?;

  if output.is_json() {
    print_json(&report)?;
    return Ok(0);
  }

  for path in &report.removed {
    print_info(path);
  }

  println!();
  if dry_run {
    print_info("Dry run - no changes made");
  } else {
    print_success("Clean complete!");
  }
  print_stat("Removed", &report.removed.len().to_string());
  print_stat("Preserved", &report.preserved.to_string());
  print_stat("Space freed", &format_bytes(report.bytes_freed));
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(0)
}
