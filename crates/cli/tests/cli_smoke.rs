//! CLI smoke tests for fab.
//!
//! These tests verify that all CLI commands run without panicking and
//! return appropriate exit codes.

mod common;

use common::{fab_cmd, write_tree};
use predicates::prelude::*;
use tempfile::TempDir;

/// A pipeline with one source image and one derivation rule.
const PIPELINE: &str = r#"
[[rule]]
name = "colors"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "cat {input} > {output}"

[[target]]
name = "all"
phony = true
inputs = [{ rule = "colors" }]
"#;

fn temp_pipeline(config: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  write_tree(&temp, &[("fabrik.toml", config), ("images/FA_1/a.png", "png")]);
  temp
}

#[test]
fn help_flag_works() {
  fab_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  fab_cmd().arg("--version").assert().success();
}

#[test]
fn plan_lists_pending_rebuilds() {
  let temp = temp_pipeline(PIPELINE);

  fab_cmd()
    .current_dir(temp.path())
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("images/FA_1/acolors.txt"))
    .stdout(predicate::str::contains("output missing"));
}

#[test]
fn plan_never_writes() {
  let temp = temp_pipeline(PIPELINE);

  fab_cmd().current_dir(temp.path()).arg("plan").assert().success();

  assert!(!temp.path().join("images/FA_1/acolors.txt").exists());
}

#[test]
fn build_produces_outputs() {
  let temp = temp_pipeline(PIPELINE);

  fab_cmd()
    .current_dir(temp.path())
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"));

  assert!(temp.path().join("images/FA_1/acolors.txt").exists());
}

#[test]
fn targets_lists_kinds_and_provenance() {
  let temp = temp_pipeline(PIPELINE);

  fab_cmd()
    .current_dir(temp.path())
    .arg("targets")
    .assert()
    .success()
    .stdout(predicate::str::contains("rule:colors"))
    .stdout(predicate::str::contains("source"))
    .stdout(predicate::str::contains("phony"));
}

#[test]
fn clean_dry_run_reports_without_deleting() {
  let temp = temp_pipeline(PIPELINE);

  fab_cmd().current_dir(temp.path()).arg("build").assert().success();

  fab_cmd()
    .current_dir(temp.path())
    .args(["clean", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("images/FA_1/acolors.txt"));

  assert!(temp.path().join("images/FA_1/acolors.txt").exists());
}

#[test]
fn missing_config_exits_2() {
  let temp = TempDir::new().unwrap();

  fab_cmd().current_dir(temp.path()).arg("plan").assert().failure().code(2);
}

#[test]
fn empty_mandatory_fileset_exits_2() {
  let temp = TempDir::new().unwrap();
  write_tree(
    &temp,
    &[(
      "fabrik.toml",
      r#"
[[rule]]
name = "colors"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "cat {input} > {output}"
mandatory = true
"#,
    )],
  );

  fab_cmd()
    .current_dir(temp.path())
    .arg("build")
    .assert()
    .failure()
    .code(2)
    .stderr(predicate::str::contains("no files match"));
}

#[test]
fn ambiguous_rules_exit_2_naming_both() {
  let temp = TempDir::new().unwrap();
  write_tree(
    &temp,
    &[
      ("images/FA_1/a.png", "png"),
      ("images/FA_1/a.jpg", "jpg"),
      (
        "fabrik.toml",
        r#"
[[rule]]
name = "colors_png"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "cat {input} > {output}"

[[rule]]
name = "colors_jpg"
inputs = "images/*/*.jpg"
from = ".jpg"
to = "colors.txt"
command = "cat {input} > {output}"
"#,
      ),
    ],
  );

  fab_cmd()
    .current_dir(temp.path())
    .arg("plan")
    .assert()
    .failure()
    .code(2)
    .stderr(predicate::str::contains("colors_png"))
    .stderr(predicate::str::contains("colors_jpg"));
}

#[test]
fn unknown_target_exits_2() {
  let temp = temp_pipeline(PIPELINE);

  fab_cmd()
    .current_dir(temp.path())
    .args(["build", "nope"])
    .assert()
    .failure()
    .code(2)
    .stderr(predicate::str::contains("nope"));
}

#[test]
fn unknown_subcommand_exits_2() {
  fab_cmd().arg("frobnicate").assert().failure().code(2);
}

#[test]
fn init_writes_starter_config_and_refuses_overwrite() {
  let temp = TempDir::new().unwrap();

  fab_cmd()
    .current_dir(temp.path())
    .arg("init")
    .assert()
    .success()
    .stdout(predicate::str::contains("fabrik.toml"));
  assert!(temp.path().join("fabrik.toml").exists());

  fab_cmd()
    .current_dir(temp.path())
    .arg("init")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("not overwriting"));
}

#[test]
fn plan_json_output_has_entries() {
  let temp = temp_pipeline(PIPELINE);

  fab_cmd()
    .current_dir(temp.path())
    .args(["plan", "--output", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"entries\""));
}
