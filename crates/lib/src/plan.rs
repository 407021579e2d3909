//! Build plan computation.
//!
//! A plan is the topologically ordered slice of the graph selected for one
//! invocation, with a per-target disposition decided against the state
//! snapshot. Computing a plan has no side effects, so the same code backs
//! both dry runs and the executor's input.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::graph::{GraphError, TargetGraph};
use crate::stale::{self, StaleCause, StaleError, StateSnapshot, Staleness};
use crate::target::{TargetId, TargetKind};

/// Errors from plan computation.
#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Why a target cannot be built this invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BlockedCause {
  /// A required, externally produced artifact is absent.
  MissingArtifact { id: TargetId, hint: Option<String> },
  /// The target's output could not be stat'ed during capture.
  StatFailed { id: TargetId, message: String },
  /// A transitive prerequisite is blocked; `root` is the first blocked ancestor.
  Upstream { root: TargetId },
}

/// What the invocation will do with a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Disposition {
  UpToDate,
  Rebuild { cause: StaleCause },
  Blocked { cause: BlockedCause },
}

/// One target selected for the invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
  pub id: TargetId,
  pub kind: TargetKind,
  pub disposition: Disposition,
}

/// The topologically ordered selection for one invocation.
///
/// Derived, never persisted; discarded after the run.
#[derive(Debug, Serialize)]
pub struct BuildPlan {
  /// Entries in topological order, prerequisites first.
  pub entries: Vec<PlanEntry>,

  /// Parallel execution waves over the same selection.
  #[serde(skip)]
  waves: Vec<Vec<TargetId>>,

  #[serde(skip)]
  index: HashMap<TargetId, usize>,
}

impl BuildPlan {
  pub fn waves(&self) -> &[Vec<TargetId>] {
    &self.waves
  }

  pub fn entry(&self, id: &TargetId) -> Option<&PlanEntry> {
    self.index.get(id).map(|&i| &self.entries[i])
  }

  pub fn rebuild_count(&self) -> usize {
    self
      .entries
      .iter()
      .filter(|e| matches!(e.disposition, Disposition::Rebuild { .. }))
      .count()
  }

  pub fn blocked_count(&self) -> usize {
    self
      .entries
      .iter()
      .filter(|e| matches!(e.disposition, Disposition::Blocked { .. }))
      .count()
  }

  pub fn up_to_date_count(&self) -> usize {
    self
      .entries
      .iter()
      .filter(|e| matches!(e.disposition, Disposition::UpToDate))
      .count()
  }
}

/// Compute the plan for the requested roots against one state snapshot.
///
/// Walks the closure in topological order, predicting the rebuilt set as it
/// goes: a target whose prerequisite will be rebuilt is itself stale even
/// when every timestamp coincides. Missing external artifacts and stat
/// failures mark their whole dependent subtree blocked instead of failing
/// the computation.
pub fn compute_plan(
  graph: &TargetGraph,
  snapshot: &StateSnapshot,
  roots: &[TargetId],
) -> Result<BuildPlan, PlanError> {
  graph.ensure_acyclic()?;

  let order = graph.topo_order(roots)?;
  let waves = graph.waves(roots)?;

  // Targets predicted to have run their action by the time dependents are
  // considered. Only file-backed targets enter: a phony action produces no
  // file and cannot make an output out of date.
  let mut rebuilt: HashSet<TargetId> = HashSet::new();
  let mut blocked_root: HashMap<TargetId, TargetId> = HashMap::new();

  let mut entries = Vec::with_capacity(order.len());

  for id in order {
    let target = graph.target(&id)?;

    let upstream = target.prerequisites.iter().find_map(|p| blocked_root.get(p).cloned());
    let disposition = if let Some(root) = upstream {
      blocked_root.insert(id.clone(), root.clone());
      Disposition::Blocked {
        cause: BlockedCause::Upstream { root },
      }
    } else {
      match stale::evaluate(target, snapshot, &rebuilt) {
        Ok(Staleness::Fresh) => Disposition::UpToDate,
        Ok(Staleness::Stale(cause)) => {
          if target.kind == TargetKind::Real && target.has_action() {
            rebuilt.insert(id.clone());
          }
          Disposition::Rebuild { cause }
        }
        Err(StaleError::MissingArtifact { id: missing, hint }) => {
          blocked_root.insert(id.clone(), id.clone());
          Disposition::Blocked {
            cause: BlockedCause::MissingArtifact { id: missing, hint },
          }
        }
        Err(StaleError::Io { id: failed, message }) => {
          blocked_root.insert(id.clone(), id.clone());
          Disposition::Blocked {
            cause: BlockedCause::StatFailed { id: failed, message },
          }
        }
      }
    };

    entries.push(PlanEntry {
      id,
      kind: target.kind,
      disposition,
    });
  }

  let index = entries
    .iter()
    .enumerate()
    .map(|(i, e)| (e.id.clone(), i))
    .collect();

  Ok(BuildPlan { entries, waves, index })
}
