//! jobwave CLI entry point.
//!
//! Binary name: `jobwave`
//!
//! Parses CLI arguments, sets up tracing, opens the repository (SQLite unless
//! `--ephemeral`), then dispatches to the command handler.

mod cli;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use cli::execution::{self, Answers};
use cli::{Cli, Commands, Output};
use jobwave_core::repository::JobRepository;
use jobwave_types::config::ExecuteOptions;
use jobwave_types::report::{HaltReason, OrchestratorState, RunReport};
use state::{AppState, EphemeralState, SqliteState};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,jobwave=debug",
        _ => "trace",
    };
    if let Err(e) = jobwave_observe::tracing_setup::init_tracing(filter, cli.otel) {
        eprintln!("Warning: tracing setup failed: {e}");
    }

    // Shell completions and plan inspection don't need a repository
    let output = Output {
        json: cli.json,
        quiet: cli.quiet,
    };
    let code = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "jobwave", &mut std::io::stdout());
            ExitCode::SUCCESS
        }
        Commands::Waves { plan } => {
            cli::waves::show_waves(&plan, output).await?;
            ExitCode::SUCCESS
        }
        command if cli.ephemeral => {
            let state = EphemeralState::init(cli.db).await;
            dispatch(&state, command, output).await?
        }
        command => {
            let state = SqliteState::init(cli.db).await?;
            dispatch(&state, command, output).await?
        }
    };

    jobwave_observe::tracing_setup::shutdown_tracing();
    Ok(code)
}

async fn dispatch<Repo: JobRepository + 'static>(
    state: &AppState<Repo>,
    command: Commands,
    output: Output,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run {
            plan,
            sequential,
            auto_resolve,
            max_concurrency,
        } => {
            let options = ExecuteOptions {
                // Unset flags defer to config.toml.
                concurrent: sequential.then_some(false),
                auto_resolve: auto_resolve.then_some(true),
                max_concurrency,
                ..ExecuteOptions::default()
            };
            let report = execution::run(state, &plan, options, output).await?;
            Ok(exit_code(&report))
        }

        Commands::Resume {
            execution_id,
            approve,
            issue,
            select,
            ack,
            auto_resolve,
        } => {
            let answers = Answers {
                approve,
                issue,
                select,
                ack,
            };
            let report =
                execution::resume(state, execution_id, answers, auto_resolve, output).await?;
            Ok(exit_code(&report))
        }

        Commands::Status { execution_id } => {
            execution::status(state, execution_id, output).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Override {
            execution_id,
            job_id,
        } => {
            execution::override_failure(state, execution_id, &job_id, output).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Completions { .. } | Commands::Waves { .. } => {
            anyhow::bail!("command does not use a repository")
        }
    }
}

/// 0 when the run completed, 2 when it halted on failures, 3 when it is
/// waiting for a human or was stopped.
fn exit_code(report: &RunReport) -> ExitCode {
    match report.state {
        OrchestratorState::Completed => ExitCode::SUCCESS,
        OrchestratorState::Halted(
            HaltReason::FailureReview | HaltReason::Systemic | HaltReason::FailFast,
        ) => ExitCode::from(2),
        _ => ExitCode::from(3),
    }
}
