//! goldcheck CI - build and run orchestration
//!
//! Provides the orchestrator that:
//! - Builds model executables through the external build tool in batches
//! - Runs each model on a bounded worker pool with timing
//! - Summarizes draws and checks or records gold baselines

pub mod command;
pub mod pipeline;
pub mod target;

// Re-export key types
pub use command::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use pipeline::{run_command, BuildReport, GoldAction, Orchestrator};
pub use target::{batched_build_commands, build_command, shell_escape, BuildTarget, EXE_SUFFIX};
