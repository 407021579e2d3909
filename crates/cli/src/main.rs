use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fabrik_lib::{AssemblyError, ConfigError, FileSetError, GraphError, PlanError};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use output::OutputFormat;

/// fab - incremental pipeline orchestrator
#[derive(Parser)]
#[command(name = "fab")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the pipeline configuration file
  #[arg(short, long, global = true, default_value = "fabrik.toml")]
  config: PathBuf,

  /// Bound on concurrently running actions
  #[arg(short, long, global = true)]
  jobs: Option<usize>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Report format
  #[arg(long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build targets and their prerequisites
  Build {
    /// Targets to build (default: everything)
    targets: Vec<String>,
  },

  /// Show what a build would do, without running anything
  Plan {
    /// Targets to plan (default: everything)
    targets: Vec<String>,
  },

  /// Remove derived artifacts
  Clean {
    /// Restrict the sweep to one rule's outputs
    #[arg(long)]
    rule: Option<String>,

    /// List without deleting
    #[arg(long)]
    dry_run: bool,
  },

  /// List every target with kind, provenance, and state
  Targets,

  /// Write a starter fabrik.toml
  Init {
    /// Directory to initialize (default: current directory)
    dir: Option<PathBuf>,
  },
}

fn main() {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_writer(std::io::stderr)
    .init();

  let result = match &cli.command {
    Commands::Build { targets } => cmd::cmd_build(&cli.config, targets, cli.jobs, cli.output),
    Commands::Plan { targets } => cmd::cmd_plan(&cli.config, targets, cli.output),
    Commands::Clean { rule, dry_run } => cmd::cmd_clean(&cli.config, rule.clone(), *dry_run, cli.output),
    Commands::Targets => cmd::cmd_targets(&cli.config, cli.output),
    Commands::Init { dir } => cmd::cmd_init(dir.as_deref()),
  };

  let code = match result {
    Ok(code) => code,
    Err(err) => {
      output::print_error(&format!("{err:#}"));
      exit_code_for(&err)
    }
  };
  std::process::exit(code);
}

/// Configuration problems detected before any action ran exit 2;
/// everything else is a build failure, exit 1.
fn exit_code_for(err: &anyhow::Error) -> i32 {
  let config_error = err.downcast_ref::<ConfigError>().is_some()
    || err.downcast_ref::<AssemblyError>().is_some()
    || err.downcast_ref::<GraphError>().is_some()
    || err.downcast_ref::<FileSetError>().is_some()
    || err.downcast_ref::<PlanError>().is_some();

  if config_error { 2 } else { 1 }
}
