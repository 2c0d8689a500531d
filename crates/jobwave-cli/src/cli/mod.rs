//! CLI command definitions for the `jobwave` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod execution;
pub mod render;
pub mod waves;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

/// Run dependency-ordered jobs in waves, pausing for humans where needed.
#[derive(Parser)]
#[command(name = "jobwave", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding the database and config.toml.
    #[arg(long, global = true, env = "JOBWAVE_DATA_DIR")]
    pub db: Option<PathBuf>,

    /// Keep all state in memory; nothing survives the process.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a plan file as a new execution.
    Run {
        /// Path to the TOML plan.
        plan: PathBuf,

        /// Run the jobs of each wave one at a time.
        #[arg(long)]
        sequential: bool,

        /// Answer auto-resolvable checkpoints without asking.
        #[arg(long)]
        auto_resolve: bool,

        /// Upper bound on concurrently running jobs within a wave.
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// Answer checkpoints and continue a paused or halted execution.
    Resume {
        /// Execution ID printed by `run`.
        execution_id: Uuid,

        /// Approve a human-verify checkpoint.
        #[arg(long, value_name = "JOB")]
        approve: Vec<String>,

        /// Report an issue on a human-verify checkpoint.
        #[arg(long, value_name = "JOB=TEXT", value_parser = parse_assignment)]
        issue: Vec<(String, String)>,

        /// Select an option of a decision checkpoint.
        #[arg(long, value_name = "JOB=OPTION", value_parser = parse_assignment)]
        select: Vec<(String, String)>,

        /// Acknowledge a human-action checkpoint, optionally with a note.
        #[arg(long, value_name = "JOB[=NOTE]", value_parser = parse_acknowledgement)]
        ack: Vec<(String, Option<String>)>,

        /// Answer auto-resolvable checkpoints from now on.
        #[arg(long)]
        auto_resolve: bool,
    },

    /// Show the report of an execution.
    Status {
        execution_id: Uuid,
    },

    /// Accept a failed job so that its dependents may run.
    Override {
        execution_id: Uuid,
        job_id: String,
    },

    /// Print the wave partition of a plan without running it.
    Waves {
        plan: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse `JOB=VALUE`.
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((job, value)) if !job.is_empty() => Ok((job.to_string(), value.to_string())),
        _ => Err(format!("expected JOB=VALUE, got '{s}'")),
    }
}

/// Parse `JOB` or `JOB=NOTE`.
fn parse_acknowledgement(s: &str) -> Result<(String, Option<String>), String> {
    match s.split_once('=') {
        Some((job, note)) if !job.is_empty() => Ok((job.to_string(), Some(note.to_string()))),
        Some(_) => Err(format!("expected JOB or JOB=NOTE, got '{s}'")),
        None if s.is_empty() => Err("job ID must not be empty".to_string()),
        None => Ok((s.to_string(), None)),
    }
}

/// Where and how much to print.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}
