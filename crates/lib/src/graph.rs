//! The dependency graph of targets.
//!
//! A directed graph with one node per target and edges running from
//! prerequisite to dependent. Provides cycle detection, topological ordering
//! and parallel execution waves, all restricted to the transitive closure of
//! the requested roots so that building one target never touches unrelated
//! branches.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::target::{Target, TargetId};

/// Errors from graph construction or traversal.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("duplicate target '{0}'")]
  DuplicateTarget(TargetId),

  #[error("target '{target}' depends on unknown prerequisite '{prerequisite}'")]
  UnknownPrerequisite { target: TargetId, prerequisite: TargetId },

  #[error("dependency cycle: {}", join_ids(members))]
  Cycle { members: Vec<TargetId> },

  #[error("unknown target '{0}'")]
  UnknownTarget(TargetId),
}

fn join_ids(ids: &[TargetId]) -> String {
  ids.iter().map(TargetId::as_str).collect::<Vec<_>>().join(" -> ")
}

/// A bipartite structure of targets and prerequisite edges.
#[derive(Debug, Default)]
pub struct TargetGraph {
  graph: DiGraph<TargetId, ()>,
  nodes: HashMap<TargetId, NodeIndex>,
  targets: HashMap<TargetId, Target>,
}

impl TargetGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a target node. Prerequisite edges are wired later by [`link`](Self::link).
  pub fn add_target(&mut self, target: Target) -> Result<(), GraphError> {
    if self.nodes.contains_key(&target.id) {
      return Err(GraphError::DuplicateTarget(target.id.clone()));
    }

    let idx = self.graph.add_node(target.id.clone());
    self.nodes.insert(target.id.clone(), idx);
    self.targets.insert(target.id.clone(), target);
    Ok(())
  }

  /// Wire prerequisite edges for every target added so far.
  ///
  /// # Errors
  ///
  /// Returns `UnknownPrerequisite` for a prerequisite identifier that does
  /// not resolve to a target in this graph. Dangling prerequisites are a
  /// configuration error, never a runtime one.
  pub fn link(&mut self) -> Result<(), GraphError> {
    for (id, target) in &self.targets {
      let dependent_idx = self.nodes[id];

      for prereq in &target.prerequisites {
        let Some(&prereq_idx) = self.nodes.get(prereq) else {
          return Err(GraphError::UnknownPrerequisite {
            target: id.clone(),
            prerequisite: prereq.clone(),
          });
        };
        // Edge from prerequisite to dependent
        self.graph.update_edge(prereq_idx, dependent_idx, ());
      }
    }

    Ok(())
  }

  /// Verify the graph has no dependency cycles.
  pub fn ensure_acyclic(&self) -> Result<(), GraphError> {
    toposort(&self.graph, None).map(|_| ()).map_err(|_| self.cycle_error())
  }

  /// Name the members of a cycle for the error message.
  fn cycle_error(&self) -> GraphError {
    for scc in tarjan_scc(&self.graph) {
      if scc.len() > 1 || (scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0])) {
        let mut members: Vec<TargetId> = scc.iter().map(|&idx| self.graph[idx].clone()).collect();
        members.sort();
        return GraphError::Cycle { members };
      }
    }
    GraphError::Cycle { members: Vec::new() }
  }

  pub fn get(&self, id: &TargetId) -> Option<&Target> {
    self.targets.get(id)
  }

  pub fn target(&self, id: &TargetId) -> Result<&Target, GraphError> {
    self.targets.get(id).ok_or_else(|| GraphError::UnknownTarget(id.clone()))
  }

  pub fn contains(&self, id: &TargetId) -> bool {
    self.targets.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// All targets, sorted by identifier for deterministic iteration.
  pub fn targets(&self) -> Vec<&Target> {
    let mut targets: Vec<&Target> = self.targets.values().collect();
    targets.sort_by(|a, b| a.id.cmp(&b.id));
    targets
  }

  /// Targets no other target depends on (the "build everything" set).
  pub fn roots(&self) -> Vec<TargetId> {
    let mut roots: Vec<TargetId> = self
      .graph
      .node_indices()
      .filter(|&idx| self.graph.neighbors_directed(idx, Direction::Outgoing).next().is_none())
      .map(|idx| self.graph[idx].clone())
      .collect();
    roots.sort();
    roots
  }

  /// Direct dependents of a target.
  pub fn dependents(&self, id: &TargetId) -> Vec<TargetId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|dep_idx| self.graph[dep_idx].clone())
      .collect()
  }

  /// The requested roots plus all their transitive prerequisites.
  pub fn closure(&self, roots: &[TargetId]) -> Result<HashSet<TargetId>, GraphError> {
    let mut seen = HashSet::new();
    let mut stack = Vec::new();

    for root in roots {
      if !self.targets.contains_key(root) {
        return Err(GraphError::UnknownTarget(root.clone()));
      }
      stack.push(root.clone());
    }

    while let Some(id) = stack.pop() {
      if !seen.insert(id.clone()) {
        continue;
      }
      for prereq in &self.targets[&id].prerequisites {
        stack.push(prereq.clone());
      }
    }

    Ok(seen)
  }

  /// Topological order restricted to the closure of the requested roots.
  ///
  /// Prerequisites come before dependents.
  pub fn topo_order(&self, roots: &[TargetId]) -> Result<Vec<TargetId>, GraphError> {
    let closure = self.closure(roots)?;
    let sorted = toposort(&self.graph, None).map_err(|_| self.cycle_error())?;

    Ok(
      sorted
        .into_iter()
        .map(|idx| self.graph[idx].clone())
        .filter(|id| closure.contains(id))
        .collect(),
    )
  }

  /// Parallel execution waves for the closure of the requested roots.
  ///
  /// Each wave contains targets whose prerequisites all sit in earlier
  /// waves; targets within a wave are independent of one another. Kahn's
  /// algorithm by levels, with in-degrees counted inside the closure only.
  pub fn waves(&self, roots: &[TargetId]) -> Result<Vec<Vec<TargetId>>, GraphError> {
    let closure = self.closure(roots)?;

    let mut in_degree: HashMap<TargetId, usize> = HashMap::new();
    for id in &closure {
      let degree = self.targets[id]
        .prerequisites
        .iter()
        .filter(|p| closure.contains(*p))
        .count();
      in_degree.insert(id.clone(), degree);
    }

    let mut remaining: HashSet<TargetId> = closure;
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<TargetId> = remaining.iter().filter(|id| in_degree[*id] == 0).cloned().collect();

      if ready.is_empty() {
        let mut members: Vec<TargetId> = remaining.into_iter().collect();
        members.sort();
        return Err(GraphError::Cycle { members });
      }

      ready.sort();

      for id in &ready {
        remaining.remove(id);
        for dependent in self.dependents(id) {
          if let Some(degree) = in_degree.get_mut(&dependent)
            && remaining.contains(&dependent)
          {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      waves.push(ready);
    }

    Ok(waves)
  }
}
