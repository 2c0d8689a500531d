//! Styled and JSON rendering of run reports and wave partitions.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use jobwave_types::job::Wave;
use jobwave_types::report::{HaltReason, OrchestratorState, RunReport};

use super::Output;

fn state_style(state: OrchestratorState) -> console::StyledObject<String> {
    let text = state.to_string();
    match state {
        OrchestratorState::Completed => style(text).green(),
        OrchestratorState::AwaitingCheckpoint(_) => style(text).yellow(),
        OrchestratorState::Halted(HaltReason::StopRequested) => style(text).yellow(),
        OrchestratorState::Halted(_) => style(text).red(),
        _ => style(text).cyan(),
    }
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print a run report.
pub fn print_report(report: &RunReport, output: Output) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    println!();
    println!(
        "  Execution {}  {}",
        style(report.execution_id).bold(),
        state_style(report.state)
    );
    println!(
        "  Waves: {}   Decision: {}",
        report.waves_total,
        style(report.decision).dim()
    );
    println!();

    let mut jobs = table();
    jobs.set_header(vec![
        Cell::new("Job").fg(Color::Cyan),
        Cell::new("Status"),
        Cell::new("Detail"),
    ]);
    for id in &report.completed {
        jobs.add_row(vec![Cell::new(id), Cell::new("completed").fg(Color::Green), Cell::new("")]);
    }
    for failed in &report.failed {
        jobs.add_row(vec![
            Cell::new(&failed.job_id),
            Cell::new("failed").fg(Color::Red),
            Cell::new(failed.reason.to_string()),
        ]);
    }
    for suspended in &report.suspended {
        jobs.add_row(vec![
            Cell::new(&suspended.job_id),
            Cell::new("suspended").fg(Color::Yellow),
            Cell::new(format!("awaiting {}", suspended.kind)),
        ]);
    }
    for blocked in &report.blocked {
        jobs.add_row(vec![
            Cell::new(&blocked.job_id),
            Cell::new("blocked").fg(Color::DarkGrey),
            Cell::new(format!("by {}", blocked.blocked_by)),
        ]);
    }
    for id in &report.pending {
        jobs.add_row(vec![Cell::new(id), Cell::new("pending"), Cell::new("")]);
    }
    println!("{jobs}");

    for rejected in &report.rejected_responses {
        println!(
            "  {} response for '{}' rejected: {}",
            style("!").red().bold(),
            rejected.job_id,
            rejected.error
        );
    }

    if report.needs_response() {
        println!();
        println!(
            "  {}",
            style(format!(
                "Answer with: jobwave resume {} --approve JOB | --select JOB=OPTION | --issue JOB=TEXT | --ack JOB",
                report.execution_id
            ))
            .dim()
        );
    } else if report.state == OrchestratorState::Halted(HaltReason::FailureReview) {
        println!();
        println!(
            "  {}",
            style(format!(
                "Accept a failure with: jobwave override {} JOB, then resume",
                report.execution_id
            ))
            .dim()
        );
    } else if report.state == OrchestratorState::Halted(HaltReason::FailFast) {
        println!();
        println!(
            "  {}",
            style(format!(
                "Run the skipped jobs with: jobwave resume {}",
                report.execution_id
            ))
            .dim()
        );
    }
    println!();
    Ok(())
}

/// Print a wave partition.
pub fn print_waves(waves: &[Wave], output: Output) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(waves)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    let mut table = table();
    table.set_header(vec![Cell::new("Wave").fg(Color::Cyan), Cell::new("Jobs")]);
    for wave in waves {
        table.add_row(vec![Cell::new(wave.index), Cell::new(wave.job_ids.join(", "))]);
    }
    println!("{table}");
    Ok(())
}
