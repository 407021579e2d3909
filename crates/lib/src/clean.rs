//! Selective artifact removal.
//!
//! Removal candidates are the targets the engine can regenerate: real
//! targets with a bound action. Externally materialized outputs (actionless
//! rules), source files, and anything matching the configured preserve globs
//! survive every clean, including a full one.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::pipeline::Pipeline;
use crate::target::{Provenance, TargetKind};

#[derive(Debug, Error)]
pub enum CleanError {
  #[error("failed to remove {}: {source}", path.display())]
  Io { path: PathBuf, source: std::io::Error },
}

/// Options for one sweep.
#[derive(Debug, Default, Clone)]
pub struct CleanOptions {
  /// Restrict to outputs of this rule.
  pub rule: Option<String>,
  /// List without deleting.
  pub dry_run: bool,
}

/// What a sweep removed (or would remove).
#[derive(Debug, Serialize)]
pub struct CleanReport {
  /// Root-relative paths, sorted.
  pub removed: Vec<String>,
  /// Existing candidates kept by the preserve globs.
  pub preserved: usize,
  pub bytes_freed: u64,
  pub dry_run: bool,
}

/// Remove derived artifacts under the preserve policy.
pub fn clean(pipeline: &Pipeline, options: &CleanOptions) -> Result<CleanReport, CleanError> {
  let mut removed = Vec::new();
  let mut preserved = 0;
  let mut bytes_freed = 0u64;

  for target in pipeline.graph().targets() {
    if target.kind != TargetKind::Real || !target.has_action() {
      continue;
    }

    if let Some(rule) = &options.rule {
      let from_rule = matches!(&target.provenance, Provenance::Rule(name) if name == rule);
      if !from_rule {
        continue;
      }
    }

    let rel = target.id.as_str();
    let path = pipeline.root().join(rel);
    let meta = match fs::metadata(&path) {
      Ok(meta) => meta,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
      Err(source) => return Err(CleanError::Io { path, source }),
    };

    if pipeline.preserved(rel) {
      debug!(path = rel, "preserved");
      preserved += 1;
      continue;
    }

    if !options.dry_run {
      fs::remove_file(&path).map_err(|source| CleanError::Io { path, source })?;
      debug!(path = rel, "removed");
    }
    bytes_freed += meta.len();
    removed.push(rel.to_string());
  }

  info!(
    removed = removed.len(),
    preserved,
    bytes_freed,
    dry_run = options.dry_run,
    "clean finished"
  );

  Ok(CleanReport {
    removed,
    preserved,
    bytes_freed,
    dry_run: options.dry_run,
  })
}
