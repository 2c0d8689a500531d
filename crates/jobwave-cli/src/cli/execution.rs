//! Execution subcommands: run, resume, status, and override.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use uuid::Uuid;

use jobwave_core::repository::JobRepository;
use jobwave_infra::plan::load_plan;
use jobwave_types::checkpoint::HumanResponse;
use jobwave_types::config::ExecuteOptions;
use jobwave_types::report::RunReport;

use super::Output;
use super::render::{print_report, print_waves};
use crate::state::AppState;

/// Answers collected from `resume` flags, in flag order.
#[derive(Debug, Default)]
pub struct Answers {
    pub approve: Vec<String>,
    pub issue: Vec<(String, String)>,
    pub select: Vec<(String, String)>,
    pub ack: Vec<(String, Option<String>)>,
}

impl Answers {
    /// One response per job; answering a job twice is an error.
    pub fn into_responses(self) -> Result<HashMap<String, HumanResponse>> {
        let mut responses = HashMap::new();
        let answers = self
            .approve
            .into_iter()
            .map(|job| (job, HumanResponse::Approved))
            .chain(
                self.issue
                    .into_iter()
                    .map(|(job, description)| (job, HumanResponse::Issue { description })),
            )
            .chain(
                self.select
                    .into_iter()
                    .map(|(job, option)| (job, HumanResponse::Selected { option })),
            )
            .chain(
                self.ack
                    .into_iter()
                    .map(|(job, note)| (job, HumanResponse::Acknowledged { note })),
            );

        for (job, response) in answers {
            if responses.contains_key(&job) {
                bail!("job '{job}' answered more than once");
            }
            responses.insert(job, response);
        }
        Ok(responses)
    }
}

/// Drive `fut` to completion, turning Ctrl+C into a stop request.
///
/// Running jobs finish and the run halts; it can be resumed later.
async fn stop_on_ctrl_c<Repo, F, T>(state: &AppState<Repo>, fut: F) -> T
where
    Repo: JobRepository + 'static,
    F: Future<Output = T>,
{
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return out,
            signal = tokio::signal::ctrl_c() => {
                if signal.is_err() {
                    return fut.await;
                }
                let runs = state.orchestrator.request_stop();
                eprintln!(
                    "  {} stopping {runs} run(s) after running jobs finish",
                    style("■").yellow()
                );
            }
        }
    }
}

/// Run a plan as a new execution.
pub async fn run<Repo: JobRepository + 'static>(
    state: &AppState<Repo>,
    plan_path: &Path,
    mut options: ExecuteOptions,
    output: Output,
) -> Result<RunReport> {
    let plan = load_plan(plan_path)
        .await
        .with_context(|| format!("loading plan {}", plan_path.display()))?;
    options.satisfied_externally.extend(plan.satisfied_externally);

    tracing::info!(plan = %plan_path.display(), jobs = plan.jobs.len(), "running plan");
    let report = stop_on_ctrl_c(state, state.orchestrator.execute(plan.jobs, options)).await?;
    print_report(&report, output)?;
    Ok(report)
}

/// Answer checkpoints and continue an execution.
pub async fn resume<Repo: JobRepository + 'static>(
    state: &AppState<Repo>,
    execution_id: Uuid,
    answers: Answers,
    auto_resolve: bool,
    output: Output,
) -> Result<RunReport> {
    let responses = answers.into_responses()?;

    if auto_resolve {
        let repo = state.orchestrator.repo();
        let mut record = repo
            .get_execution(&execution_id)
            .await?
            .with_context(|| format!("execution {execution_id} not found"))?;
        if record.options.auto_resolve != Some(true) {
            record.options.auto_resolve = Some(true);
            repo.save_execution(&record).await?;
        }
    }

    let report = stop_on_ctrl_c(
        state,
        state.orchestrator.resume_execution(execution_id, responses),
    )
    .await?;
    print_report(&report, output)?;
    Ok(report)
}

/// Show the current report and wave partition of an execution.
pub async fn status<Repo: JobRepository + 'static>(
    state: &AppState<Repo>,
    execution_id: Uuid,
    output: Output,
) -> Result<RunReport> {
    let report = state.orchestrator.report(execution_id).await?;
    if output.json {
        print_report(&report, output)?;
        return Ok(report);
    }

    print_report(&report, output)?;
    if !output.quiet {
        let waves = state.orchestrator.waves(execution_id).await?;
        print_waves(&waves, output)?;
        println!("  {}", style(format!("Data dir: {}", state.data_dir.display())).dim());
        println!();
    }
    Ok(report)
}

/// Accept a failed job.
pub async fn override_failure<Repo: JobRepository + 'static>(
    state: &AppState<Repo>,
    execution_id: Uuid,
    job_id: &str,
    output: Output,
) -> Result<RunReport> {
    let report = state
        .orchestrator
        .override_failure(execution_id, job_id)
        .await?;
    if !output.json && !output.quiet {
        println!();
        println!(
            "  {} failure of '{}' accepted",
            style("✓").green(),
            style(job_id).cyan()
        );
    }
    print_report(&report, output)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_become_responses() {
        let answers = Answers {
            approve: vec!["a".to_string()],
            issue: vec![("b".to_string(), "broken".to_string())],
            select: vec![("c".to_string(), "x".to_string())],
            ack: vec![("d".to_string(), None)],
        };
        let responses = answers.into_responses().unwrap();
        assert_eq!(responses.len(), 4);
        assert_eq!(responses["a"], HumanResponse::Approved);
        assert_eq!(
            responses["c"],
            HumanResponse::Selected {
                option: "x".to_string()
            }
        );
    }

    #[test]
    fn answering_twice_is_an_error() {
        let answers = Answers {
            approve: vec!["a".to_string()],
            select: vec![("a".to_string(), "x".to_string())],
            ..Answers::default()
        };
        assert!(answers.into_responses().is_err());
    }
}
