//! Declarative pipeline configuration.
//!
//! The rule set lives in a TOML file (`fabrik.toml` by convention) and is
//! loaded once at startup. Structural validation happens here; anything that
//! needs the filesystem (ambiguous outputs, empty mandatory filesets, cycles)
//! is checked during pipeline assembly.
//!
//! ```toml
//! root = "."
//! jobs = 4
//! preserve = ["**/notes.txt"]
//!
//! [[rule]]
//! name = "objects"
//! inputs = "images/*/*.png"
//! from = ".png"
//! to = "object.txt"
//! command = "python3 scripts/detect.py {input} {output}"
//! prerequisites = ["scripts/detect.py"]
//! mandatory = true
//!
//! [[target]]
//! name = "all"
//! phony = true
//! inputs = [{ rule = "objects" }]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors from loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", path.display())]
  Io { path: PathBuf, source: std::io::Error },

  #[error("failed to parse {}: {source}", path.display())]
  Parse { path: PathBuf, source: toml::de::Error },

  #[error("duplicate rule name '{0}'")]
  DuplicateRule(String),

  #[error("rule '{rule}' has an empty '{field}' suffix")]
  EmptySuffix { rule: String, field: &'static str },

  #[error("target must set exactly one of 'path' or 'name'")]
  TargetIdentifier,

  #[error("phony target '{0}' must use 'name', not 'path'")]
  PhonyWithPath(String),

  #[error("real target '{0}' must use 'path', not 'name'")]
  RealWithName(String),

  #[error("target '{0}' declared more than once")]
  DuplicateTarget(String),

  #[error("jobs must be at least 1")]
  ZeroJobs,
}

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  /// Pipeline root for glob resolution and action working directories,
  /// relative to the configuration file.
  #[serde(default = "default_root")]
  pub root: String,

  /// Default bound on concurrently running actions.
  #[serde(default = "default_jobs")]
  pub jobs: usize,

  /// Globs for artifacts a clean must never remove.
  #[serde(default)]
  pub preserve: Vec<String>,

  #[serde(default, rename = "rule")]
  pub rules: Vec<RuleConfig>,

  #[serde(default, rename = "target")]
  pub targets: Vec<TargetConfig>,
}

fn default_root() -> String {
  ".".to_string()
}

fn default_jobs() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// One `[[rule]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
  pub name: String,
  /// Glob selecting the rule's input files.
  pub inputs: String,
  /// Input suffix replaced by `to` to form the output path.
  pub from: String,
  pub to: String,
  /// Static prerequisites added to every expanded target.
  #[serde(default)]
  pub prerequisites: Vec<String>,
  /// Action template; omit for outputs produced by an external manual step.
  #[serde(default)]
  pub command: Option<String>,
  /// Whether zero matched inputs aborts the invocation.
  #[serde(default)]
  pub mandatory: bool,
  /// Remediation shown when an actionless output is missing.
  #[serde(default)]
  pub hint: Option<String>,
}

/// One `[[target]]` entry: an explicit real or phony target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
  /// Root-relative output path (real targets).
  #[serde(default)]
  pub path: Option<String>,
  /// Bare name (phony targets).
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub phony: bool,
  #[serde(default)]
  pub command: Option<String>,
  #[serde(default)]
  pub inputs: Vec<PrereqEntry>,
  #[serde(default)]
  pub hint: Option<String>,
}

impl TargetConfig {
  /// The target identifier, whichever of `path`/`name` is set.
  pub fn id(&self) -> Option<&str> {
    self.path.as_deref().or(self.name.as_deref())
  }
}

/// A prerequisite declaration: a literal path or a rule-output selector.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrereqEntry {
  /// A literal root-relative path.
  Path(String),
  /// All outputs of the named rule, optionally limited to a directory prefix.
  Selector {
    rule: String,
    #[serde(default)]
    under: Option<String>,
  },
}

impl Config {
  /// Load and validate a configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
      path: path.to_path_buf(),
      source: e,
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })?;

    config.validate()?;
    Ok(config)
  }

  /// Structural validation independent of the filesystem.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.jobs == 0 {
      return Err(ConfigError::ZeroJobs);
    }

    let mut rule_names = Vec::new();
    for rule in &self.rules {
      if rule_names.contains(&rule.name.as_str()) {
        return Err(ConfigError::DuplicateRule(rule.name.clone()));
      }
      rule_names.push(&rule.name);

      if rule.from.is_empty() {
        return Err(ConfigError::EmptySuffix {
          rule: rule.name.clone(),
          field: "from",
        });
      }
      if rule.to.is_empty() {
        return Err(ConfigError::EmptySuffix {
          rule: rule.name.clone(),
          field: "to",
        });
      }
    }

    let mut target_ids = Vec::new();
    for target in &self.targets {
      let id = match (&target.path, &target.name) {
        (Some(_), Some(_)) | (None, None) => return Err(ConfigError::TargetIdentifier),
        (Some(path), None) => {
          if target.phony {
            return Err(ConfigError::PhonyWithPath(path.clone()));
          }
          path.as_str()
        }
        (None, Some(name)) => {
          if !target.phony {
            return Err(ConfigError::RealWithName(name.clone()));
          }
          name.as_str()
        }
      };

      if target_ids.contains(&id) {
        return Err(ConfigError::DuplicateTarget(id.to_string()));
      }
      target_ids.push(id);
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  const PIPELINE: &str = r#"
root = "."
jobs = 2
preserve = ["**/notes.txt"]

[[rule]]
name = "colors"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "python3 scripts/colors.py {input} {output}"
prerequisites = ["scripts/colors.py"]
mandatory = true

[[rule]]
name = "instances"
inputs = "images/*/annotations.json"
from = "annotations.json"
to = "object_instances.txt"
hint = "run the detection notebook by hand"

[[target]]
path = "dashboard/summary.txt"
command = "cat {inputs} > {output}"
inputs = [{ rule = "colors" }]

[[target]]
name = "all"
phony = true
inputs = [{ rule = "colors", under = "images/FA_1" }, "dashboard/summary.txt"]
"#;

  fn load(content: &str) -> Result<Config, ConfigError> {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fabrik.toml");
    fs::write(&path, content).unwrap();
    Config::load(&path)
  }

  #[test]
  fn load_full_pipeline() {
    let config = load(PIPELINE).unwrap();

    assert_eq!(config.jobs, 2);
    assert_eq!(config.rules.len(), 2);
    assert_eq!(config.targets.len(), 2);
    assert!(config.rules[0].mandatory);
    assert!(config.rules[1].command.is_none());
    assert_eq!(config.targets[1].id(), Some("all"));

    match &config.targets[1].inputs[0] {
      PrereqEntry::Selector { rule, under } => {
        assert_eq!(rule, "colors");
        assert_eq!(under.as_deref(), Some("images/FA_1"));
      }
      other => panic!("expected selector, got {other:?}"),
    }
  }

  #[test]
  fn defaults_applied() {
    let config = load("").unwrap();
    assert_eq!(config.root, ".");
    assert!(config.jobs >= 1);
    assert!(config.preserve.is_empty());
  }

  #[test]
  fn duplicate_rule_name_rejected() {
    let content = r#"
[[rule]]
name = "colors"
inputs = "*.png"
from = ".png"
to = "colors.txt"

[[rule]]
name = "colors"
inputs = "*.jpg"
from = ".jpg"
to = "colors.txt"
"#;
    assert!(matches!(load(content), Err(ConfigError::DuplicateRule(ref n)) if n == "colors"));
  }

  #[test]
  fn empty_suffix_rejected() {
    let content = r#"
[[rule]]
name = "bad"
inputs = "*.png"
from = ""
to = "colors.txt"
"#;
    assert!(matches!(load(content), Err(ConfigError::EmptySuffix { field: "from", .. })));
  }

  #[test]
  fn phony_target_with_path_rejected() {
    let content = r#"
[[target]]
path = "dashboard/all"
phony = true
"#;
    assert!(matches!(load(content), Err(ConfigError::PhonyWithPath(_))));
  }

  #[test]
  fn real_target_with_name_rejected() {
    let content = r#"
[[target]]
name = "summary"
command = "touch summary"
"#;
    assert!(matches!(load(content), Err(ConfigError::RealWithName(_))));
  }

  #[test]
  fn duplicate_target_rejected() {
    let content = r#"
[[target]]
path = "dashboard/summary.txt"
command = "touch {output}"

[[target]]
path = "dashboard/summary.txt"
command = "touch {output}"
"#;
    assert!(matches!(load(content), Err(ConfigError::DuplicateTarget(_))));
  }

  #[test]
  fn zero_jobs_rejected() {
    assert!(matches!(load("jobs = 0"), Err(ConfigError::ZeroJobs)));
  }

  #[test]
  fn unknown_field_rejected() {
    assert!(matches!(load("colour = true"), Err(ConfigError::Parse { .. })));
  }

  #[test]
  fn missing_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let result = Config::load(&temp.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
  }
}
