//! Target identity and metadata.
//!
//! A target is one node of the build graph: either a real, file-backed
//! artifact addressed by its root-relative path, or a phony grouping node
//! addressed by a bare name.

use std::fmt;

use serde::Serialize;

/// Identifier of a target, unique within one graph.
///
/// For real targets this is the root-relative path of the artifact with
/// forward slashes; for phony targets it is the declared name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetId(pub String);

impl TargetId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for TargetId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

/// Whether a target maps to a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetKind {
  /// File-backed; staleness is decided by modification times.
  Real,
  /// Grouping-only; never maps to a file.
  Phony,
}

/// Where a target came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Provenance {
  /// Expanded from the named pattern rule.
  Rule(String),
  /// Declared as an explicit `[[target]]` entry.
  Explicit,
  /// Inserted automatically for a prerequisite file nothing else produces.
  Source,
}

impl fmt::Display for Provenance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Provenance::Rule(name) => write!(f, "rule:{name}"),
      Provenance::Explicit => f.write_str("explicit"),
      Provenance::Source => f.write_str("source"),
    }
  }
}

/// The external step bound to a target.
///
/// The template is rendered against the target's prerequisites and output
/// path at execution time, then handed to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
  pub template: String,
}

impl Action {
  pub fn new(template: impl Into<String>) -> Self {
    Self {
      template: template.into(),
    }
  }
}

/// One node of the build graph.
#[derive(Debug, Clone)]
pub struct Target {
  pub id: TargetId,
  pub kind: TargetKind,
  /// Ordered, deduplicated prerequisite identifiers.
  pub prerequisites: Vec<TargetId>,
  pub action: Option<Action>,
  pub provenance: Provenance,
  /// Remediation shown when an externally produced artifact is absent.
  pub hint: Option<String>,
}

impl Target {
  pub fn real(id: impl Into<String>, provenance: Provenance) -> Self {
    Self {
      id: TargetId::new(id),
      kind: TargetKind::Real,
      prerequisites: Vec::new(),
      action: None,
      provenance,
      hint: None,
    }
  }

  pub fn phony(id: impl Into<String>, provenance: Provenance) -> Self {
    Self {
      id: TargetId::new(id),
      kind: TargetKind::Phony,
      prerequisites: Vec::new(),
      action: None,
      provenance,
      hint: None,
    }
  }

  pub fn with_action(mut self, template: impl Into<String>) -> Self {
    self.action = Some(Action::new(template));
    self
  }

  pub fn with_hint(mut self, hint: Option<String>) -> Self {
    self.hint = hint;
    self
  }

  /// Append a prerequisite, keeping the list deduplicated in declaration order.
  pub fn push_prerequisite(&mut self, id: TargetId) {
    if !self.prerequisites.contains(&id) {
      self.prerequisites.push(id);
    }
  }

  pub fn with_prerequisites<I>(mut self, ids: I) -> Self
  where
    I: IntoIterator<Item = TargetId>,
  {
    for id in ids {
      self.push_prerequisite(id);
    }
    self
  }

  pub fn is_phony(&self) -> bool {
    matches!(self.kind, TargetKind::Phony)
  }

  pub fn has_action(&self) -> bool {
    self.action.is_some()
  }
}
