mod build;
mod clean;
mod init;
mod plan;
mod targets;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use init::cmd_init;
pub use plan::cmd_plan;
pub use targets::cmd_targets;

use std::path::Path;

use anyhow::Result;
use fabrik_lib::{Config, Pipeline};

/// Load the configuration file and assemble the pipeline, rooted relative
/// to the config file's directory.
pub(crate) fn load_pipeline(config_path: &Path) -> Result<Pipeline> {
  let config = Config::load(config_path)?;
  let dir = config_path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or(Path::new("."));
  Ok(Pipeline::from_config(&config, dir)?)
}
