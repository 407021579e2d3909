//! Staleness evaluation.
//!
//! Modification state is captured once per invocation into a
//! [`StateSnapshot`]; the verdict itself is a pure function of the target,
//! the snapshot and the set of targets already rebuilt this invocation. The
//! evaluator never triggers a rebuild, it only reports.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::graph::TargetGraph;
use crate::target::{Target, TargetId, TargetKind};

/// Errors from evaluating a target.
#[derive(Debug, Error)]
pub enum StaleError {
  /// A required, externally produced artifact is absent. Higher severity
  /// than ordinary staleness: the engine has no action to regenerate it.
  #[error("required artifact '{id}' is missing{}", format_hint(hint.as_deref()))]
  MissingArtifact { id: TargetId, hint: Option<String> },

  /// The target's output could not be stat'ed. Fatal for this target only;
  /// the rest of the invocation proceeds.
  #[error("failed to stat '{id}': {message}")]
  Io { id: TargetId, message: String },
}

fn format_hint(hint: Option<&str>) -> String {
  match hint {
    Some(hint) => format!(" ({hint})"),
    None => String::new(),
  }
}

/// Why a target needs rebuilding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StaleCause {
  /// Phony target with a bound action; considered on every invocation.
  AlwaysRuns,
  /// The output file does not exist.
  OutputMissing,
  /// A prerequisite file is strictly newer than the output.
  PrerequisiteNewer { prerequisite: TargetId },
  /// A prerequisite was rebuilt earlier in this invocation.
  PrerequisiteRebuilt { prerequisite: TargetId },
}

/// Verdict for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Staleness {
  Fresh,
  Stale(StaleCause),
}

impl Staleness {
  pub fn is_stale(&self) -> bool {
    matches!(self, Staleness::Stale(_))
  }
}

/// Existence and modification times of every real target, captured once.
///
/// A stat failure is recorded against the affected target rather than
/// aborting the capture; the verdict for that one target surfaces it later.
#[derive(Debug)]
pub struct StateSnapshot {
  mtimes: HashMap<TargetId, Option<SystemTime>>,
  errors: HashMap<TargetId, String>,
}

impl StateSnapshot {
  /// Stat every real target in the graph relative to `root`.
  pub fn capture(root: &Path, graph: &TargetGraph) -> Self {
    let mut mtimes = HashMap::new();
    let mut errors = HashMap::new();

    for target in graph.targets() {
      if target.kind != TargetKind::Real {
        continue;
      }

      let path = root.join(target.id.as_str());
      let mtime = match std::fs::metadata(&path).and_then(|meta| meta.modified()) {
        Ok(mtime) => Some(mtime),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
          warn!(target = %target.id, path = %path.display(), error = %e, "stat failed");
          errors.insert(target.id.clone(), e.to_string());
          None
        }
      };

      mtimes.insert(target.id.clone(), mtime);
    }

    debug!(targets = mtimes.len(), "captured modification state");
    Self { mtimes, errors }
  }

  #[cfg(test)]
  pub fn from_mtimes(mtimes: HashMap<TargetId, Option<SystemTime>>) -> Self {
    Self {
      mtimes,
      errors: HashMap::new(),
    }
  }

  #[cfg(test)]
  pub fn record_error(&mut self, id: &str, message: &str) {
    self.errors.insert(TargetId::new(id), message.to_string());
  }

  /// Modification time of a real target; `None` if absent or phony.
  pub fn mtime(&self, id: &TargetId) -> Option<SystemTime> {
    self.mtimes.get(id).copied().flatten()
  }

  pub fn exists(&self, id: &TargetId) -> bool {
    self.mtime(id).is_some()
  }

  /// The stat failure recorded for a target during capture, if any.
  pub fn stat_error(&self, id: &TargetId) -> Option<&str> {
    self.errors.get(id).map(String::as_str)
  }
}

/// Decide whether a target needs rebuilding.
///
/// Pure and idempotent; `rebuilt` is the set of file-backed targets whose
/// action already ran and succeeded this invocation, which keeps the verdict
/// transitive even when timestamps coincide.
///
/// # Errors
///
/// Returns `MissingArtifact` for an absent real target with no action to
/// regenerate it, and `Io` for a real target whose output could not be
/// stat'ed during capture.
pub fn evaluate(
  target: &Target,
  snapshot: &StateSnapshot,
  rebuilt: &HashSet<TargetId>,
) -> Result<Staleness, StaleError> {
  if target.kind == TargetKind::Real
    && let Some(message) = snapshot.stat_error(&target.id)
  {
    return Err(StaleError::Io {
      id: target.id.clone(),
      message: message.to_string(),
    });
  }

  match (target.kind, target.has_action()) {
    // Action-bound phony targets always run; the action decides to no-op.
    (TargetKind::Phony, true) => Ok(Staleness::Stale(StaleCause::AlwaysRuns)),

    // Pure grouping nodes pass staleness through from their prerequisites.
    (TargetKind::Phony, false) => {
      for prereq in &target.prerequisites {
        if rebuilt.contains(prereq) {
          return Ok(Staleness::Stale(StaleCause::PrerequisiteRebuilt {
            prerequisite: prereq.clone(),
          }));
        }
      }
      Ok(Staleness::Fresh)
    }

    (TargetKind::Real, true) => {
      let Some(mtime) = snapshot.mtime(&target.id) else {
        return Ok(Staleness::Stale(StaleCause::OutputMissing));
      };

      for prereq in &target.prerequisites {
        if rebuilt.contains(prereq) {
          return Ok(Staleness::Stale(StaleCause::PrerequisiteRebuilt {
            prerequisite: prereq.clone(),
          }));
        }
        // Equal timestamps are fresh; transitivity is guaranteed by the
        // rebuilt set, not by the filesystem clock resolution.
        if let Some(prereq_mtime) = snapshot.mtime(prereq)
          && prereq_mtime > mtime
        {
          return Ok(Staleness::Stale(StaleCause::PrerequisiteNewer {
            prerequisite: prereq.clone(),
          }));
        }
      }

      Ok(Staleness::Fresh)
    }

    // Externally produced artifacts and source files: the engine cannot
    // regenerate them, so presence is the whole verdict.
    (TargetKind::Real, false) => {
      let Some(mtime) = snapshot.mtime(&target.id) else {
        return Err(StaleError::MissingArtifact {
          id: target.id.clone(),
          hint: target.hint.clone(),
        });
      };

      for prereq in &target.prerequisites {
        if let Some(prereq_mtime) = snapshot.mtime(prereq)
          && prereq_mtime > mtime
        {
          warn!(
            target = %target.id,
            prerequisite = %prereq,
            "externally produced artifact is older than its prerequisite"
          );
        }
      }

      Ok(Staleness::Fresh)
    }
  }
}
