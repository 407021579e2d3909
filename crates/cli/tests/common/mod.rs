//! Shared helpers for fab CLI tests.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get a Command for the fab binary.
pub fn fab_cmd() -> Command {
  cargo_bin_cmd!("fab")
}

/// Write a throwaway pipeline tree: (root-relative path, content) pairs.
pub fn write_tree(temp: &TempDir, files: &[(&str, &str)]) {
  for (path, content) in files {
    let path = temp.path().join(path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }
}
