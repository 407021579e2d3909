use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success};

/// Starter configuration modeling a multi-stage image pipeline: per-image
/// color and object extraction, hand-produced instance annotations, derived
/// vectors, and an embedding plot per folder.
const TEMPLATE: &str = r#"# Fabrik pipeline configuration.
#
# Real targets are root-relative file paths; phony targets are bare names.
# Actions run through `sh -c` from the pipeline root.

root = "."
jobs = 4

# Detection outputs survive `fab clean`, whether hand-produced or derived.
preserve = [
  "images/*/object_instances.txt",
  "images/*/vectors_object_instances.txt",
]

[[rule]]
name = "colors"
inputs = "images/*/*.png"
from = ".png"
to = "colors.txt"
command = "python3 scripts/get_colors.py {input} {output}"
prerequisites = ["scripts/get_colors.py"]
mandatory = true

[[rule]]
name = "objects"
inputs = "images/*/*.png"
from = ".png"
to = "object.txt"
command = "python3 scripts/detect.py {input} {output}"
prerequisites = ["scripts/detect.py"]

# object_instances.txt is produced by a manual detection pass; fabrik
# only checks that it exists and explains what to do when it does not.
[[rule]]
name = "vectors"
inputs = "images/*/object_instances.txt"
from = "object_instances.txt"
to = "vectors_object_instances.txt"
command = "python3 scripts/vectorize.py {input} {output}"
prerequisites = ["scripts/vectorize.py"]

[[target]]
path = "dashboard/embedding.html"
command = "python3 scripts/plot_embedding.py {inputs} {output}"
inputs = ["scripts/plot_embedding.py", { rule = "vectors" }]

[[target]]
name = "all"
phony = true
inputs = [{ rule = "colors" }, { rule = "objects" }, "dashboard/embedding.html"]
"#;

pub fn cmd_init(dir: Option<&Path>) -> Result<i32> {
  let dir = dir.unwrap_or(Path::new("."));
  fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

  let path = dir.join("fabrik.toml");
  if path.exists() {
    print_error(&format!("{} already exists, not overwriting", path.display()));
    return Ok(1);
  }

  fs::write(&path, TEMPLATE).with_context(|| format!("Failed to write {}", path.display()))?;

  print_success(&format!("Wrote {}", path.display()));
  print_info("Edit the rules to match your pipeline, then run 'fab plan'");
  Ok(0)
}
