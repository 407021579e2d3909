//! Execution outcomes and reports.

use std::fmt;

use serde::Serialize;

use crate::target::TargetId;

/// Knobs for one execution run.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Bound on concurrently running actions, floor 1.
  pub jobs: usize,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      jobs: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
    }
  }
}

impl ExecuteConfig {
  pub fn with_jobs(jobs: usize) -> Self {
    Self { jobs: jobs.max(1) }
  }
}

/// Why a target failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureCause {
  /// The action exited non-zero.
  Action { code: Option<i32>, stderr_tail: String },
  /// The action exited zero but the declared output does not exist.
  ContractViolation { output: TargetId },
  /// A required, externally produced artifact is absent.
  MissingArtifact { id: TargetId, hint: Option<String> },
  /// I/O failure invoking the action or statting the target.
  Io { message: String },
  /// A transitive prerequisite failed; the action never ran.
  Upstream { prerequisite: TargetId, root: TargetId },
}

impl fmt::Display for FailureCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureCause::Action { code: Some(code), .. } => write!(f, "action exited with code {code}"),
      FailureCause::Action { code: None, .. } => f.write_str("action terminated by signal"),
      FailureCause::ContractViolation { output } => {
        write!(f, "action succeeded but did not produce '{output}'")
      }
      FailureCause::MissingArtifact { id, hint } => {
        write!(f, "required artifact '{id}' is missing")?;
        if let Some(hint) = hint {
          write!(f, " ({hint})")?;
        }
        Ok(())
      }
      FailureCause::Io { message } => write!(f, "i/o failure: {message}"),
      FailureCause::Upstream { prerequisite, root } => {
        write!(f, "prerequisite '{prerequisite}' failed (first failure: '{root}')")
      }
    }
  }
}

/// Terminal state of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TargetOutcome {
  /// Fresh; nothing ran.
  Skipped,
  /// The action ran and succeeded, or a grouping phony refreshed.
  Rebuilt,
  Failed(FailureCause),
}

impl TargetOutcome {
  pub fn is_failed(&self) -> bool {
    matches!(self, TargetOutcome::Failed(_))
  }
}

/// Outcome of one target, in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
  pub id: TargetId,
  pub outcome: TargetOutcome,
  /// Wall time of the action; zero when nothing ran.
  pub duration_ms: u64,
}

/// Aggregate result of one invocation.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
  pub targets: Vec<TargetReport>,
}

impl BuildReport {
  pub fn skipped_count(&self) -> usize {
    self
      .targets
      .iter()
      .filter(|t| t.outcome == TargetOutcome::Skipped)
      .count()
  }

  pub fn rebuilt_count(&self) -> usize {
    self
      .targets
      .iter()
      .filter(|t| t.outcome == TargetOutcome::Rebuilt)
      .count()
  }

  pub fn failed_count(&self) -> usize {
    self.targets.iter().filter(|t| t.outcome.is_failed()).count()
  }

  pub fn is_success(&self) -> bool {
    self.failed_count() == 0
  }

  pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
    self.targets.iter().filter(|t| t.outcome.is_failed())
  }

  pub fn outcome(&self, id: &TargetId) -> Option<&TargetOutcome> {
    self.targets.iter().find(|t| &t.id == id).map(|t| &t.outcome)
  }
}
