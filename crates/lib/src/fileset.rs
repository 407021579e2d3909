//! Glob resolution against a filesystem snapshot.
//!
//! The resolver walks the pipeline root exactly once per invocation and
//! matches every glob pattern against that captured file list. Re-globbing
//! mid-build would let concurrently written artifacts leak into the plan, so
//! all staleness and expansion decisions share this one snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use globset::Glob;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Errors from snapshotting or pattern matching.
#[derive(Debug, Error)]
pub enum FileSetError {
  #[error("invalid glob pattern '{pattern}': {source}")]
  Pattern { pattern: String, source: globset::Error },

  #[error("no files match mandatory pattern '{pattern}'")]
  NoMatch { pattern: String },

  #[error("failed to walk {}: {source}", path.display())]
  Walk { path: PathBuf, source: walkdir::Error },
}

/// An ordered, deduplicated list of root-relative paths matching one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
  pub pattern: String,
  pub paths: Vec<String>,
}

impl FileSet {
  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.paths.iter().map(String::as_str)
  }
}

/// One filesystem snapshot with per-pattern memoized matching.
pub struct FileSetResolver {
  root: PathBuf,
  /// Sorted root-relative paths with forward slashes.
  files: Vec<String>,
  memo: HashMap<String, FileSet>,
}

impl FileSetResolver {
  /// Walk `root` once and capture every regular file under it.
  pub fn snapshot(root: &Path) -> Result<Self, FileSetError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
      let entry = entry.map_err(|e| FileSetError::Walk {
        path: root.to_path_buf(),
        source: e,
      })?;

      if !entry.file_type().is_file() {
        continue;
      }

      if let Ok(rel) = entry.path().strip_prefix(root) {
        files.push(rel.to_string_lossy().replace('\\', "/"));
      }
    }

    files.sort();
    files.dedup();

    debug!(root = %root.display(), files = files.len(), "captured filesystem snapshot");

    Ok(Self {
      root: root.to_path_buf(),
      files,
      memo: HashMap::new(),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn files(&self) -> &[String] {
    &self.files
  }

  pub fn contains(&self, rel_path: &str) -> bool {
    self.files.binary_search_by(|f| f.as_str().cmp(rel_path)).is_ok()
  }

  /// Match `pattern` against the snapshot, memoized per pattern string.
  pub fn resolve(&mut self, pattern: &str) -> Result<FileSet, FileSetError> {
    if let Some(set) = self.memo.get(pattern) {
      return Ok(set.clone());
    }

    let matcher = Glob::new(pattern)
      .map_err(|e| FileSetError::Pattern {
        pattern: pattern.to_string(),
        source: e,
      })?
      .compile_matcher();

    let paths: Vec<String> = self.files.iter().filter(|f| matcher.is_match(f)).cloned().collect();

    debug!(pattern, matches = paths.len(), "resolved fileset");

    let set = FileSet {
      pattern: pattern.to_string(),
      paths,
    };
    self.memo.insert(pattern.to_string(), set.clone());
    Ok(set)
  }

  /// Like [`resolve`](Self::resolve) but empty results are a hard error.
  pub fn resolve_mandatory(&mut self, pattern: &str) -> Result<FileSet, FileSetError> {
    let set = self.resolve(pattern)?;
    if set.is_empty() {
      return Err(FileSetError::NoMatch {
        pattern: pattern.to_string(),
      });
    }
    Ok(set)
  }
}
