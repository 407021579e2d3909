//! fabrik-lib: Core types and logic for Fabrik
//!
//! This crate provides the building blocks of the incremental pipeline
//! orchestrator:
//! - `Target` / `TargetGraph`: real and phony build targets and their
//!   prerequisite graph
//! - `PatternRule`: suffix-substitution rules expanded over glob filesets
//! - `Pipeline`: assembly of a configuration into a linked, acyclic graph
//! - `BuildPlan`: per-invocation staleness verdicts in topological order
//! - `execute`: wave-ordered, bounded-parallel action execution
//! - `clean`: derived-artifact removal under the preserve policy

pub mod clean;
pub mod config;
pub mod execute;
pub mod fileset;
pub mod graph;
pub mod pipeline;
pub mod plan;
pub mod rules;
pub mod stale;
pub mod target;
pub mod template;

pub use clean::{CleanError, CleanOptions, CleanReport, clean};
pub use config::{Config, ConfigError};
pub use execute::{BuildReport, ExecuteConfig, ExecuteError, FailureCause, TargetOutcome, execute_plan};
pub use fileset::{FileSet, FileSetError, FileSetResolver};
pub use graph::{GraphError, TargetGraph};
pub use pipeline::{AssemblyError, Pipeline};
pub use plan::{BlockedCause, BuildPlan, Disposition, PlanError, compute_plan};
pub use rules::PatternRule;
pub use stale::{StaleCause, StaleError, StateSnapshot, Staleness};
pub use target::{Provenance, Target, TargetId, TargetKind};
