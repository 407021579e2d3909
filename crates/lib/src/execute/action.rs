//! Shell action invocation.
//!
//! A rendered command runs through `sh -c` from the pipeline root with the
//! parent environment, stdout and stderr captured. Success is exit 0 plus,
//! for file-backed targets, the declared output existing afterward.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::types::FailureCause;
use crate::target::TargetId;

/// Lines of stderr surfaced on failure.
const STDERR_TAIL_LINES: usize = 10;

pub(super) async fn run_action(
  root: &Path,
  id: &TargetId,
  command: &str,
  output: Option<&str>,
) -> Result<(), FailureCause> {
  debug!(target = %id, command, "invoking action");

  let result = Command::new("sh")
    .arg("-c")
    .arg(command)
    .current_dir(root)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await;

  let out = match result {
    Ok(out) => out,
    Err(e) => {
      return Err(FailureCause::Io {
        message: format!("failed to spawn action: {e}"),
      });
    }
  };

  if !out.status.success() {
    return Err(FailureCause::Action {
      code: out.status.code(),
      stderr_tail: tail(&String::from_utf8_lossy(&out.stderr), STDERR_TAIL_LINES),
    });
  }

  if let Some(output) = output
    && !root.join(output).exists()
  {
    return Err(FailureCause::ContractViolation {
      output: TargetId::new(output),
    });
  }

  Ok(())
}

/// The last `n` lines of `text`, trimmed of the trailing newline.
fn tail(text: &str, n: usize) -> String {
  let lines: Vec<&str> = text.lines().collect();
  let start = lines.len().saturating_sub(n);
  lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn tail_keeps_last_lines_only() {
    let text = (1..=15).map(|i| format!("line {i}\n")).collect::<String>();
    let tail = tail(&text, 10);
    assert!(tail.starts_with("line 6"));
    assert!(tail.ends_with("line 15"));
  }

  #[tokio::test]
  async fn successful_action_with_output() {
    let temp = TempDir::new().unwrap();
    let id = TargetId::new("out.txt");

    let result = run_action(temp.path(), &id, "echo hi > out.txt", Some("out.txt")).await;
    assert!(result.is_ok());
    assert!(temp.path().join("out.txt").exists());
  }

  #[tokio::test]
  async fn nonzero_exit_captures_stderr_tail() {
    let temp = TempDir::new().unwrap();
    let id = TargetId::new("out.txt");

    let result = run_action(temp.path(), &id, "echo boom >&2; exit 3", Some("out.txt")).await;
    match result {
      Err(FailureCause::Action { code, stderr_tail }) => {
        assert_eq!(code, Some(3));
        assert_eq!(stderr_tail, "boom");
      }
      other => panic!("expected action failure, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn zero_exit_without_output_is_contract_violation() {
    let temp = TempDir::new().unwrap();
    let id = TargetId::new("out.txt");

    let result = run_action(temp.path(), &id, "true", Some("out.txt")).await;
    assert!(matches!(
      result,
      Err(FailureCause::ContractViolation { ref output }) if output.as_str() == "out.txt"
    ));
  }

  #[tokio::test]
  async fn phony_action_needs_no_output() {
    let temp = TempDir::new().unwrap();
    let id = TargetId::new("deploy");

    let result = run_action(temp.path(), &id, "true", None).await;
    assert!(result.is_ok());
  }
}
