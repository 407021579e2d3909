//! Pipeline assembly.
//!
//! Turns a validated [`Config`] plus one filesystem snapshot into a linked,
//! acyclic [`TargetGraph`]: rules are expanded over their filesets, explicit
//! targets and rule-output selectors are resolved, source leaves are
//! inserted for prerequisite files nothing produces, and command templates
//! are checked. Everything here fails before any action runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, ConfigError, PrereqEntry};
use crate::fileset::{FileSetError, FileSetResolver};
use crate::graph::{GraphError, TargetGraph};
use crate::rules::PatternRule;
use crate::target::{Provenance, Target, TargetId, TargetKind};
use crate::template::{self, Placeholder, TemplateError};

/// Errors detected while assembling the graph, before any action runs.
#[derive(Debug, Error)]
pub enum AssemblyError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  FileSet(#[from] FileSetError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("rules '{first}' and '{second}' both produce '{output}'")]
  AmbiguousRule {
    output: TargetId,
    first: String,
    second: String,
  },

  #[error("target '{target}' selects outputs of unknown rule '{rule}'")]
  UnknownRuleSelector { target: String, rule: String },

  #[error("invalid command template for '{target}': {source}")]
  Template { target: TargetId, source: TemplateError },

  #[error("phony target '{target}' uses {{output}} in its command")]
  OutputInPhony { target: TargetId },

  #[error("target '{target}' uses {{input}} but has no file prerequisites")]
  InputWithoutPrerequisites { target: TargetId },

  #[error("invalid preserve pattern: {source}")]
  PreservePattern { source: globset::Error },
}

/// A fully assembled pipeline: the graph, its root directory, and the
/// policies the executor and clean need.
pub struct Pipeline {
  root: PathBuf,
  graph: TargetGraph,
  jobs: usize,
  preserve: GlobSet,
}

impl Pipeline {
  /// Assemble the pipeline from a configuration, rooted relative to the
  /// directory containing the config file.
  pub fn from_config(config: &Config, config_dir: &Path) -> Result<Self, AssemblyError> {
    config.validate()?;

    let root = config_dir.join(&config.root);
    let mut resolver = FileSetResolver::snapshot(&root)?;
    let mut graph = TargetGraph::new();

    // Which rule claimed each output, for ambiguity detection.
    let mut claimed: HashMap<TargetId, String> = HashMap::new();
    let mut rule_outputs: HashMap<String, Vec<TargetId>> = HashMap::new();

    for rule_config in &config.rules {
      let rule = PatternRule::from(rule_config);
      let inputs = if rule.mandatory {
        resolver.resolve_mandatory(&rule.inputs)?
      } else {
        resolver.resolve(&rule.inputs)?
      };

      let targets = rule.expand(&inputs);
      debug!(rule = %rule.name, inputs = inputs.len(), targets = targets.len(), "expanded rule");

      let outputs = rule_outputs.entry(rule.name.clone()).or_default();
      for target in targets {
        if let Some(first) = claimed.get(&target.id) {
          return Err(AssemblyError::AmbiguousRule {
            output: target.id.clone(),
            first: first.clone(),
            second: rule.name.clone(),
          });
        }
        claimed.insert(target.id.clone(), rule.name.clone());
        outputs.push(target.id.clone());
        graph.add_target(target)?;
      }
    }

    for target_config in &config.targets {
      // `validate` guarantees exactly one of path/name is set.
      let Some(id) = target_config.id() else {
        continue;
      };

      let mut target = if target_config.phony {
        Target::phony(id, Provenance::Explicit)
      } else {
        Target::real(id, Provenance::Explicit)
      };
      target = target.with_hint(target_config.hint.clone());
      if let Some(command) = &target_config.command {
        target = target.with_action(command.clone());
      }

      for entry in &target_config.inputs {
        match entry {
          PrereqEntry::Path(path) => target.push_prerequisite(TargetId::new(path.clone())),
          PrereqEntry::Selector { rule, under } => {
            let Some(outputs) = rule_outputs.get(rule) else {
              return Err(AssemblyError::UnknownRuleSelector {
                target: id.to_string(),
                rule: rule.clone(),
              });
            };
            for output in outputs {
              if under.as_deref().is_none_or(|prefix| under_prefix(output.as_str(), prefix)) {
                target.push_prerequisite(output.clone());
              }
            }
          }
        }
      }

      graph.add_target(target)?;
    }

    insert_source_leaves(&mut graph, &resolver)?;
    validate_templates(&graph)?;

    graph.link()?;
    graph.ensure_acyclic()?;

    let mut builder = GlobSetBuilder::new();
    for pattern in &config.preserve {
      builder.add(Glob::new(pattern).map_err(|source| AssemblyError::PreservePattern { source })?);
    }
    let preserve = builder.build().map_err(|source| AssemblyError::PreservePattern { source })?;

    info!(
      root = %root.display(),
      targets = graph.len(),
      rules = config.rules.len(),
      "assembled pipeline"
    );

    Ok(Self {
      root,
      graph,
      jobs: config.jobs,
      preserve,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn graph(&self) -> &TargetGraph {
    &self.graph
  }

  /// Configured concurrency bound; the CLI may override it.
  pub fn jobs(&self) -> usize {
    self.jobs
  }

  /// The "build everything" set: targets nothing depends on.
  pub fn default_roots(&self) -> Vec<TargetId> {
    self.graph.roots()
  }

  /// Map requested target names to graph roots; empty means everything.
  pub fn resolve_roots(&self, requested: &[String]) -> Result<Vec<TargetId>, GraphError> {
    if requested.is_empty() {
      return Ok(self.default_roots());
    }

    requested
      .iter()
      .map(|name| {
        let id = TargetId::new(name.clone());
        if self.graph.contains(&id) {
          Ok(id)
        } else {
          Err(GraphError::UnknownTarget(id))
        }
      })
      .collect()
  }

  /// Whether a root-relative path matches the configured preserve globs.
  pub fn preserved(&self, path: &str) -> bool {
    self.preserve.is_match(path)
  }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
  let prefix = prefix.trim_end_matches('/');
  path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Insert a source target for every prerequisite file nothing produces.
///
/// Prerequisites absent from both the graph and the snapshot stay dangling
/// and are rejected by `link()`.
fn insert_source_leaves(graph: &mut TargetGraph, resolver: &FileSetResolver) -> Result<(), GraphError> {
  let mut missing: Vec<TargetId> = graph
    .targets()
    .iter()
    .flat_map(|t| t.prerequisites.iter())
    .filter(|p| !graph.contains(p) && resolver.contains(p.as_str()))
    .cloned()
    .collect();
  missing.sort();
  missing.dedup();

  for id in missing {
    debug!(target = %id, "inserted source leaf");
    graph.add_target(Target::real(id.as_str(), Provenance::Source))?;
  }

  Ok(())
}

/// Check every bound command template against its target's shape.
fn validate_templates(graph: &TargetGraph) -> Result<(), AssemblyError> {
  for target in graph.targets() {
    let Some(action) = &target.action else {
      continue;
    };

    let segments = template::parse(&action.template).map_err(|source| AssemblyError::Template {
      target: target.id.clone(),
      source,
    })?;

    let file_prereqs = target
      .prerequisites
      .iter()
      .filter(|p| graph.get(p).is_none_or(|t| t.kind == TargetKind::Real))
      .count();

    for placeholder in template::placeholders(&segments) {
      match placeholder {
        Placeholder::Output if target.is_phony() => {
          return Err(AssemblyError::OutputInPhony {
            target: target.id.clone(),
          });
        }
        Placeholder::Input | Placeholder::Inputs if file_prereqs == 0 => {
          return Err(AssemblyError::InputWithoutPrerequisites {
            target: target.id.clone(),
          });
        }
        _ => {}
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn tree(files: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for file in files {
      let path = temp.path().join(file);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, b"x").unwrap();
    }
    temp
  }

  fn assemble(files: &[&str], config: &str) -> Result<Pipeline, AssemblyError> {
    let temp = tree(files);
    let config: Config = toml::from_str(config).unwrap();
    Pipeline::from_config(&config, temp.path())
  }

  const PIPELINE: &str = r#"
[[rule]]
name = "colors"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "python3 scripts/colors.py {input} {output}"
prerequisites = ["scripts/colors.py"]
mandatory = true

[[target]]
path = "dashboard/summary.txt"
command = "cat {inputs} > {output}"
inputs = [{ rule = "colors" }]

[[target]]
name = "all"
phony = true
inputs = ["dashboard/summary.txt"]
"#;

  const FILES: &[&str] = &["images/FA_1/a.png", "images/FA_1/b.png", "scripts/colors.py"];

  #[test]
  fn assembles_rules_explicit_targets_and_source_leaves() {
    let pipeline = assemble(FILES, PIPELINE).unwrap();
    let graph = pipeline.graph();

    // Two expanded outputs, the explicit target, the phony, three sources.
    assert_eq!(graph.len(), 7);

    let summary = graph.get(&TargetId::new("dashboard/summary.txt")).unwrap();
    assert_eq!(
      summary.prerequisites,
      vec![
        TargetId::new("images/FA_1/acolors.txt"),
        TargetId::new("images/FA_1/bcolors.txt"),
      ]
    );

    let source = graph.get(&TargetId::new("images/FA_1/a.png")).unwrap();
    assert_eq!(source.provenance, Provenance::Source);
    assert!(!source.has_action());

    assert_eq!(pipeline.default_roots(), vec![TargetId::new("all")]);
  }

  #[test]
  fn selector_under_limits_to_directory_prefix() {
    let config = r#"
[[rule]]
name = "colors"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "python3 scripts/colors.py {input} {output}"

[[target]]
name = "classic"
phony = true
inputs = [{ rule = "colors", under = "images/FA_1" }]
"#;
    let files = &["images/FA_1/a.png", "images/FA_2/c.png"];
    let pipeline = assemble(files, config).unwrap();

    let classic = pipeline.graph().get(&TargetId::new("classic")).unwrap();
    assert_eq!(classic.prerequisites, vec![TargetId::new("images/FA_1/acolors.txt")]);
  }

  #[test]
  fn two_rules_claiming_one_output_rejected() {
    let config = r#"
[[rule]]
name = "colors_png"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "python3 scripts/colors.py {input} {output}"

[[rule]]
name = "colors_jpg"
inputs = "images/*/*.jpg"
from = ".jpg"
to = "colors.txt"
command = "python3 scripts/colors.py {input} {output}"
"#;
    let files = &["images/FA_1/a.png", "images/FA_1/a.jpg"];
    let result = assemble(files, config);

    match result {
      Err(AssemblyError::AmbiguousRule { output, first, second }) => {
        assert_eq!(output.as_str(), "images/FA_1/acolors.txt");
        assert_eq!(first, "colors_png");
        assert_eq!(second, "colors_jpg");
      }
      other => panic!("expected ambiguous rule, got {other:?}", other = other.err()),
    }
  }

  #[test]
  fn empty_mandatory_fileset_rejected() {
    let result = assemble(&["scripts/colors.py"], PIPELINE);
    assert!(matches!(result, Err(AssemblyError::FileSet(FileSetError::NoMatch { .. }))));
  }

  #[test]
  fn unknown_rule_selector_rejected() {
    let config = r#"
[[target]]
name = "all"
phony = true
inputs = [{ rule = "plots" }]
"#;
    let result = assemble(&[], config);
    assert!(
      matches!(result, Err(AssemblyError::UnknownRuleSelector { ref rule, .. }) if rule == "plots")
    );
  }

  #[test]
  fn dangling_prerequisite_rejected() {
    let config = r#"
[[target]]
path = "out.txt"
command = "cat {inputs} > {output}"
inputs = ["does-not-exist.txt"]
"#;
    let result = assemble(&[], config);
    assert!(matches!(
      result,
      Err(AssemblyError::Graph(GraphError::UnknownPrerequisite { .. }))
    ));
  }

  #[test]
  fn unknown_placeholder_rejected() {
    let config = r#"
[[target]]
path = "out.txt"
command = "convert {source} {output}"
inputs = ["in.txt"]
"#;
    let result = assemble(&["in.txt"], config);
    assert!(matches!(result, Err(AssemblyError::Template { .. })));
  }

  #[test]
  fn phony_command_with_output_placeholder_rejected() {
    let config = r#"
[[target]]
name = "deploy"
phony = true
command = "rsync {output} remote:"
"#;
    let result = assemble(&[], config);
    assert!(matches!(result, Err(AssemblyError::OutputInPhony { .. })));
  }

  #[test]
  fn input_placeholder_without_prerequisites_rejected() {
    let config = r#"
[[target]]
path = "out.txt"
command = "cp {input} {output}"
"#;
    let result = assemble(&[], config);
    assert!(matches!(result, Err(AssemblyError::InputWithoutPrerequisites { .. })));
  }

  #[test]
  fn dependency_cycle_rejected() {
    let config = r#"
[[target]]
path = "a.txt"
command = "cat b.txt > {output}"
inputs = ["b.txt"]

[[target]]
path = "b.txt"
command = "cat a.txt > {output}"
inputs = ["a.txt"]
"#;
    let result = assemble(&[], config);
    assert!(matches!(result, Err(AssemblyError::Graph(GraphError::Cycle { .. }))));
  }

  #[test]
  fn resolve_roots_checks_existence() {
    let pipeline = assemble(FILES, PIPELINE).unwrap();

    let roots = pipeline.resolve_roots(&["dashboard/summary.txt".to_string()]).unwrap();
    assert_eq!(roots, vec![TargetId::new("dashboard/summary.txt")]);

    let result = pipeline.resolve_roots(&["nope".to_string()]);
    assert!(matches!(result, Err(GraphError::UnknownTarget(_))));
  }

  #[test]
  fn preserve_globs_matched_against_relative_paths() {
    let config = r#"
preserve = ["**/notes.txt", "images/*/object_instances.txt"]
"#;
    let pipeline = assemble(&[], config).unwrap();

    assert!(pipeline.preserved("images/FA_1/notes.txt"));
    assert!(pipeline.preserved("images/FA_1/object_instances.txt"));
    assert!(!pipeline.preserved("images/FA_1/acolors.txt"));
  }
}
