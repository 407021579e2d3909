//! Pattern rule expansion.
//!
//! A pattern rule maps an input filename shape to a derived output filename
//! shape by suffix substitution: `.png` -> `object.txt` turns
//! `images/FA_1/a.png` into `images/FA_1/aobject.txt`. Expanding a rule over
//! a fileset yields one real target per matched input, carrying the input
//! and the rule's static prerequisites.

use tracing::warn;

use crate::config::RuleConfig;
use crate::fileset::FileSet;
use crate::target::{Provenance, Target, TargetId};

/// A declarative mapping from input files to derived outputs.
#[derive(Debug, Clone)]
pub struct PatternRule {
  pub name: String,
  /// Glob selecting the rule's input files.
  pub inputs: String,
  /// Suffix stripped from each input path.
  pub from: String,
  /// Suffix appended in its place.
  pub to: String,
  /// Prerequisites added to every expanded target, e.g. the stage script.
  pub static_prerequisites: Vec<String>,
  /// Action template; `None` marks outputs produced by an external manual step.
  pub command: Option<String>,
  /// Whether an empty input fileset is a configuration error.
  pub mandatory: bool,
  /// Remediation surfaced when an actionless output is absent.
  pub hint: Option<String>,
}

impl From<&RuleConfig> for PatternRule {
  fn from(config: &RuleConfig) -> Self {
    Self {
      name: config.name.clone(),
      inputs: config.inputs.clone(),
      from: config.from.clone(),
      to: config.to.clone(),
      static_prerequisites: config.prerequisites.clone(),
      command: config.command.clone(),
      mandatory: config.mandatory,
      hint: config.hint.clone(),
    }
  }
}

impl PatternRule {
  /// Derived output path for an input, or `None` if the suffix does not match.
  pub fn output_for(&self, input: &str) -> Option<String> {
    input.strip_suffix(&self.from).map(|stem| format!("{stem}{}", self.to))
  }

  /// Reverse mapping: the input path an output was derived from.
  pub fn input_for(&self, output: &str) -> Option<String> {
    output.strip_suffix(&self.to).map(|stem| format!("{stem}{}", self.from))
  }

  /// Expand the rule over a fileset, one target per matched input.
  ///
  /// Inputs not ending in the `from` suffix are skipped with a warning; the
  /// glob and the suffix are declared separately and may disagree.
  pub fn expand(&self, inputs: &FileSet) -> Vec<Target> {
    let mut targets = Vec::new();

    for input in inputs.iter() {
      let Some(output) = self.output_for(input) else {
        warn!(rule = %self.name, input, suffix = %self.from, "input does not match rule suffix, skipping");
        continue;
      };

      let mut target =
        Target::real(output, Provenance::Rule(self.name.clone())).with_hint(self.hint.clone());
      if let Some(command) = &self.command {
        target = target.with_action(command.clone());
      }
      target.push_prerequisite(TargetId::new(input));
      for prereq in &self.static_prerequisites {
        target.push_prerequisite(TargetId::new(prereq.clone()));
      }

      targets.push(target);
    }

    targets
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn object_rule() -> PatternRule {
    PatternRule {
      name: "objects".to_string(),
      inputs: "images/*/*.png".to_string(),
      from: ".png".to_string(),
      to: "object.txt".to_string(),
      static_prerequisites: vec!["scripts/detect.py".to_string()],
      command: Some("python3 scripts/detect.py {input} {output}".to_string()),
      mandatory: true,
      hint: None,
    }
  }

  fn fileset(paths: &[&str]) -> FileSet {
    FileSet {
      pattern: "images/*/*.png".to_string(),
      paths: paths.iter().map(|p| p.to_string()).collect(),
    }
  }

  #[test]
  fn suffix_substitution_forward_and_reverse() {
    let rule = object_rule();
    assert_eq!(
      rule.output_for("images/FA_1/a.png").as_deref(),
      Some("images/FA_1/aobject.txt")
    );
    assert_eq!(
      rule.input_for("images/FA_1/aobject.txt").as_deref(),
      Some("images/FA_1/a.png")
    );
    assert_eq!(rule.output_for("images/FA_1/a.jpg"), None);
  }

  #[test]
  fn expand_produces_one_target_per_input() {
    let rule = object_rule();
    let targets = rule.expand(&fileset(&["images/FA_1/a.png", "images/FA_1/b.png"]));

    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].id, TargetId::new("images/FA_1/aobject.txt"));
    assert_eq!(
      targets[0].prerequisites,
      vec![TargetId::new("images/FA_1/a.png"), TargetId::new("scripts/detect.py")]
    );
    assert_eq!(targets[1].id, TargetId::new("images/FA_1/bobject.txt"));
    assert_eq!(
      targets[1].prerequisites,
      vec![TargetId::new("images/FA_1/b.png"), TargetId::new("scripts/detect.py")]
    );
    assert!(targets.iter().all(Target::has_action));
  }

  #[test]
  fn expand_skips_inputs_without_suffix() {
    let rule = object_rule();
    let targets = rule.expand(&fileset(&["images/FA_1/a.png", "images/FA_1/readme"]));
    assert_eq!(targets.len(), 1);
  }

  #[test]
  fn actionless_rule_carries_hint() {
    let rule = PatternRule {
      command: None,
      hint: Some("run the detection notebook by hand".to_string()),
      ..object_rule()
    };

    let targets = rule.expand(&fileset(&["images/FA_1/a.png"]));
    assert!(!targets[0].has_action());
    assert_eq!(targets[0].hint.as_deref(), Some("run the detection notebook by hand"));
  }
}
