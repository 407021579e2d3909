//! Plan execution.
//!
//! Walks the plan's waves in order; within a wave, stale targets run their
//! actions concurrently on a semaphore-bounded pool. Failure never stops
//! the whole run: the failed target's dependents are marked `Failed` with
//! the first failing ancestor attributed, and independent branches continue.
//! Only this loop mutates the shared outcome map, after each join.

mod action;
mod types;

pub use types::{BuildReport, ExecuteConfig, FailureCause, TargetOutcome, TargetReport};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::graph::{GraphError, TargetGraph};
use crate::plan::BuildPlan;
use crate::stale::{self, StaleError, StateSnapshot, Staleness};
use crate::target::{Target, TargetId, TargetKind};
use crate::template::{self, RenderContext, TemplateError};

/// Errors that abort the whole run, as opposed to failing one target.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("invalid command template for '{target}': {source}")]
  Template { target: TargetId, source: TemplateError },

  #[error("worker task panicked: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// Execute a plan against the pipeline root.
///
/// At most one action invocation per target per run; an action never starts
/// before all of its prerequisites are terminal. Already-running actions
/// finish after a failure elsewhere (no forced kill).
pub async fn execute_plan(
  graph: &TargetGraph,
  root: &Path,
  plan: &BuildPlan,
  snapshot: &StateSnapshot,
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError> {
  let semaphore = Arc::new(Semaphore::new(config.jobs.max(1)));

  let mut outcomes: HashMap<TargetId, TargetOutcome> = HashMap::new();
  let mut durations: HashMap<TargetId, u64> = HashMap::new();
  // First failing ancestor for every target in a failed chain.
  let mut failed_root: HashMap<TargetId, TargetId> = HashMap::new();
  // File-backed targets whose action ran and succeeded this run.
  let mut rebuilt: HashSet<TargetId> = HashSet::new();

  for wave in plan.waves() {
    let mut running: JoinSet<(TargetId, Result<(), FailureCause>, u64)> = JoinSet::new();

    for id in wave {
      let target = graph.target(id)?;

      if let Some((prereq, ancestor)) = first_failed_prerequisite(target, &failed_root) {
        warn!(target = %id, prerequisite = %prereq, "not built, upstream failure");
        failed_root.insert(id.clone(), ancestor.clone());
        outcomes.insert(
          id.clone(),
          TargetOutcome::Failed(FailureCause::Upstream {
            prerequisite: prereq,
            root: ancestor,
          }),
        );
        continue;
      }

      match stale::evaluate(target, snapshot, &rebuilt) {
        Ok(Staleness::Fresh) => {
          debug!(target = %id, "up to date");
          outcomes.insert(id.clone(), TargetOutcome::Skipped);
        }
        Ok(Staleness::Stale(cause)) => {
          debug!(target = %id, ?cause, "stale");
          match &target.action {
            // Only grouping phonies are stale without an action; they
            // refresh by fiat and never enter the rebuilt set.
            None => {
              outcomes.insert(id.clone(), TargetOutcome::Rebuilt);
            }
            Some(bound) => {
              let ctx = render_context(graph, target);
              let command =
                template::substitute(&bound.template, &ctx).map_err(|source| ExecuteError::Template {
                  target: id.clone(),
                  source,
                })?;

              let output = (target.kind == TargetKind::Real).then(|| id.as_str().to_string());
              let id = id.clone();
              let root = root.to_path_buf();
              let semaphore = semaphore.clone();

              running.spawn(async move {
                // Closed only on JoinSet drop, which never happens here.
                let _permit = semaphore.acquire_owned().await;
                let started = Instant::now();
                let result = action::run_action(&root, &id, &command, output.as_deref()).await;
                (id, result, started.elapsed().as_millis() as u64)
              });
            }
          }
        }
        Err(StaleError::MissingArtifact { id: missing, hint }) => {
          error!(target = %id, "required artifact missing");
          failed_root.insert(id.clone(), id.clone());
          outcomes.insert(
            id.clone(),
            TargetOutcome::Failed(FailureCause::MissingArtifact { id: missing, hint }),
          );
        }
        Err(StaleError::Io { id: failed, message }) => {
          error!(target = %id, %message, "stat failed");
          failed_root.insert(id.clone(), id.clone());
          outcomes.insert(
            id.clone(),
            TargetOutcome::Failed(FailureCause::Io {
              message: format!("failed to stat '{failed}': {message}"),
            }),
          );
        }
      }
    }

    while let Some(joined) = running.join_next().await {
      let (id, result, elapsed_ms) = joined?;
      durations.insert(id.clone(), elapsed_ms);

      match result {
        Ok(()) => {
          info!(target = %id, elapsed_ms, "rebuilt");
          if graph.target(&id)?.kind == TargetKind::Real {
            rebuilt.insert(id.clone());
          }
          outcomes.insert(id, TargetOutcome::Rebuilt);
        }
        Err(cause) => {
          error!(target = %id, %cause, "failed");
          failed_root.insert(id.clone(), id.clone());
          outcomes.insert(id, TargetOutcome::Failed(cause));
        }
      }
    }
  }

  let targets = plan
    .entries
    .iter()
    .map(|entry| TargetReport {
      id: entry.id.clone(),
      outcome: outcomes.remove(&entry.id).unwrap_or(TargetOutcome::Skipped),
      duration_ms: durations.get(&entry.id).copied().unwrap_or(0),
    })
    .collect();

  Ok(BuildReport { targets })
}

fn first_failed_prerequisite(
  target: &Target,
  failed_root: &HashMap<TargetId, TargetId>,
) -> Option<(TargetId, TargetId)> {
  target
    .prerequisites
    .iter()
    .find_map(|p| failed_root.get(p).map(|root| (p.clone(), root.clone())))
}

/// Placeholder values for one target's command.
fn render_context(graph: &TargetGraph, target: &Target) -> RenderContext {
  let inputs: Vec<String> = target
    .prerequisites
    .iter()
    .filter(|p| graph.get(p).is_none_or(|t| t.kind == TargetKind::Real))
    .map(|p| p.as_str().to_string())
    .collect();

  RenderContext {
    input: inputs.first().cloned().unwrap_or_default(),
    inputs,
    output: match target.kind {
      TargetKind::Real => target.id.as_str().to_string(),
      TargetKind::Phony => String::new(),
    },
    target: target.id.as_str().to_string(),
  }
}
