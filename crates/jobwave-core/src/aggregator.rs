//! Result aggregation: folds a wave's outcomes into a decision, propagates
//! failures to dependents, and renders run reports.

use std::collections::{BTreeSet, HashMap};

use jobwave_types::checkpoint::SuspendedJob;
use jobwave_types::config::FailurePolicy;
use jobwave_types::job::{FailureReason, Job, JobStatus, Wave};
use jobwave_types::report::{
    BlockedJob, Decision, FailedJob, OrchestratorState, RejectedResponse, RunReport,
    SuspendedEntry,
};
use uuid::Uuid;

use crate::graph::transitive_dependents;
use crate::store::JobStore;

/// Counts and decision for one wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveSummary {
    pub wave: u32,
    /// Jobs that ran at all (completed, failed, or suspended).
    pub ran: usize,
    pub completed: usize,
    pub failed: usize,
    pub suspended: usize,
    /// Failed jobs whose failure was not overridden, in wave order.
    pub failures: Vec<String>,
    /// True iff every non-suspended job of the wave completed.
    pub successful: bool,
    pub decision: Decision,
}

/// Summarize `wave` from the current job snapshots.
///
/// Every job that ran failing (with at least two having run) is treated as
/// systemic. Any other unresolved failure halts for review under
/// `FailurePolicy::Halt` and continues under `ContinueWithBlocked`.
pub fn aggregate(
    wave: &Wave,
    jobs: &[Job],
    policy: FailurePolicy,
    overrides: &BTreeSet<String>,
) -> WaveSummary {
    let by_id: HashMap<&str, &Job> = jobs.iter().map(|j| (j.id.as_str(), j)).collect();

    let mut completed = 0;
    let mut failed = 0;
    let mut suspended = 0;
    let mut failures = Vec::new();
    let mut successful = true;

    for id in &wave.job_ids {
        let Some(job) = by_id.get(id.as_str()) else {
            continue;
        };
        match job.status {
            JobStatus::Completed => completed += 1,
            JobStatus::Suspended => suspended += 1,
            JobStatus::Failed => {
                failed += 1;
                successful = false;
                if !overrides.contains(id) {
                    failures.push(id.clone());
                }
            }
            JobStatus::Pending | JobStatus::Running | JobStatus::Blocked => successful = false,
        }
    }

    let ran = completed + failed + suspended;
    let decision = if ran >= 2 && failures.len() == ran {
        Decision::StopSystemic
    } else if !failures.is_empty() && policy == FailurePolicy::Halt {
        Decision::HaltForReview
    } else {
        Decision::Continue
    };

    WaveSummary {
        wave: wave.index,
        ran,
        completed,
        failed,
        suspended,
        failures,
        successful,
        decision,
    }
}

/// Block every pending transitive dependent of each non-overridden failure.
///
/// Returns the jobs newly blocked by this call. Jobs that already ran are
/// never relabelled, and a job reachable from several failures keeps the
/// first ancestor found in input order.
pub fn block_dependents(
    store: &JobStore,
    jobs: &[Job],
    overrides: &BTreeSet<String>,
) -> Vec<BlockedJob> {
    let mut newly_blocked = Vec::new();

    for failed in jobs {
        if store.status(&failed.id) != Some(JobStatus::Failed) || overrides.contains(&failed.id) {
            continue;
        }
        for dependent in transitive_dependents(&failed.id, jobs) {
            if let Ok(Some(_)) = store.block(&dependent, &failed.id) {
                newly_blocked.push(BlockedJob {
                    job_id: dependent,
                    blocked_by: failed.id.clone(),
                });
            }
        }
    }

    newly_blocked
}

/// Inputs for `build_report` besides the job snapshots.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub execution_id: Uuid,
    pub state: OrchestratorState,
    pub decision: Decision,
    pub waves_total: u32,
    pub current_wave: Option<u32>,
    pub rejected_responses: Vec<RejectedResponse>,
}

/// Render a `RunReport` from job snapshots and suspension records.
pub fn build_report(header: ReportHeader, jobs: &[Job], suspended: &[SuspendedJob]) -> RunReport {
    let kinds: HashMap<&str, _> = suspended
        .iter()
        .map(|s| (s.job_id.as_str(), s.checkpoint.kind))
        .collect();

    let mut report = RunReport {
        execution_id: header.execution_id,
        state: header.state,
        decision: header.decision,
        waves_total: header.waves_total,
        current_wave: header.current_wave,
        completed: Vec::new(),
        failed: Vec::new(),
        suspended: Vec::new(),
        blocked: Vec::new(),
        pending: Vec::new(),
        rejected_responses: header.rejected_responses,
    };

    for job in jobs {
        match job.status {
            JobStatus::Completed => report.completed.push(job.id.clone()),
            JobStatus::Failed => report.failed.push(FailedJob {
                job_id: job.id.clone(),
                reason: job
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| FailureReason::runner("no reason recorded")),
            }),
            JobStatus::Suspended => {
                if let Some(kind) = kinds.get(job.id.as_str()) {
                    report.suspended.push(SuspendedEntry {
                        job_id: job.id.clone(),
                        kind: *kind,
                    });
                }
            }
            JobStatus::Blocked => report.blocked.push(BlockedJob {
                job_id: job.id.clone(),
                blocked_by: job.blocked_by.clone().unwrap_or_default(),
            }),
            JobStatus::Pending | JobStatus::Running => report.pending.push(job.id.clone()),
        }
    }

    report.completed.sort();
    report.failed.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    report.suspended.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    report.blocked.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    report.pending.sort();
    report.rejected_responses.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwave_types::checkpoint::Checkpoint;
    use serde_json::json;

    fn job(id: &str, deps: &[&str], status: JobStatus) -> Job {
        let mut job = Job::new(id).depends_on(deps.iter().copied());
        job.status = status;
        job
    }

    fn wave(index: u32, ids: &[&str]) -> Wave {
        Wave {
            index,
            job_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn no_overrides() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn all_completed_continues() {
        let jobs = vec![
            job("a", &[], JobStatus::Completed),
            job("b", &[], JobStatus::Completed),
        ];
        let summary = aggregate(&wave(0, &["a", "b"]), &jobs, FailurePolicy::Halt, &no_overrides());
        assert_eq!(summary.decision, Decision::Continue);
        assert!(summary.successful);
        assert_eq!(summary.completed, 2);
    }

    #[test]
    fn single_failure_depends_on_policy() {
        let jobs = vec![
            job("a", &[], JobStatus::Failed),
            job("b", &[], JobStatus::Completed),
        ];
        let w = wave(0, &["a", "b"]);

        let halt = aggregate(&w, &jobs, FailurePolicy::Halt, &no_overrides());
        assert_eq!(halt.decision, Decision::HaltForReview);
        assert_eq!(halt.failures, vec!["a".to_string()]);
        assert!(!halt.successful);

        let cont = aggregate(&w, &jobs, FailurePolicy::ContinueWithBlocked, &no_overrides());
        assert_eq!(cont.decision, Decision::Continue);
    }

    #[test]
    fn lone_failed_job_is_not_systemic() {
        let jobs = vec![job("a", &[], JobStatus::Failed)];
        let summary = aggregate(&wave(0, &["a"]), &jobs, FailurePolicy::Halt, &no_overrides());
        assert_eq!(summary.decision, Decision::HaltForReview);
    }

    #[test]
    fn every_job_failing_is_systemic_regardless_of_policy() {
        let jobs = vec![
            job("a", &[], JobStatus::Failed),
            job("b", &[], JobStatus::Failed),
        ];
        let summary = aggregate(
            &wave(0, &["a", "b"]),
            &jobs,
            FailurePolicy::ContinueWithBlocked,
            &no_overrides(),
        );
        assert_eq!(summary.decision, Decision::StopSystemic);
    }

    #[test]
    fn overridden_failure_does_not_halt() {
        let jobs = vec![
            job("a", &[], JobStatus::Failed),
            job("b", &[], JobStatus::Completed),
        ];
        let overrides = BTreeSet::from(["a".to_string()]);
        let summary = aggregate(&wave(0, &["a", "b"]), &jobs, FailurePolicy::Halt, &overrides);
        assert_eq!(summary.decision, Decision::Continue);
        assert!(!summary.successful);
    }

    #[test]
    fn suspended_jobs_do_not_spoil_success() {
        let jobs = vec![
            job("a", &[], JobStatus::Completed),
            job("b", &[], JobStatus::Suspended),
        ];
        let summary = aggregate(&wave(0, &["a", "b"]), &jobs, FailurePolicy::Halt, &no_overrides());
        assert!(summary.successful);
        assert_eq!(summary.suspended, 1);
    }

    #[test]
    fn blocks_transitive_dependents_only_once() {
        let jobs = vec![
            job("a", &[], JobStatus::Failed),
            job("b", &["a"], JobStatus::Pending),
            job("c", &["b"], JobStatus::Pending),
            job("d", &[], JobStatus::Pending),
        ];
        let store = JobStore::new(Uuid::nil(), jobs.clone()).unwrap();

        let blocked = block_dependents(&store, &jobs, &no_overrides());
        let ids: Vec<&str> = blocked.iter().map(|b| b.job_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(blocked.iter().all(|b| b.blocked_by == "a"));
        assert_eq!(store.status("d"), Some(JobStatus::Pending));

        assert!(block_dependents(&store, &jobs, &no_overrides()).is_empty());
    }

    #[test]
    fn completed_dependents_are_never_relabelled() {
        let jobs = vec![
            job("a", &[], JobStatus::Failed),
            job("b", &["a"], JobStatus::Completed),
        ];
        let store = JobStore::new(Uuid::nil(), jobs.clone()).unwrap();
        assert!(block_dependents(&store, &jobs, &no_overrides()).is_empty());
        assert_eq!(store.status("b"), Some(JobStatus::Completed));
    }

    #[test]
    fn overridden_failure_blocks_nothing() {
        let jobs = vec![
            job("a", &[], JobStatus::Failed),
            job("b", &["a"], JobStatus::Pending),
        ];
        let store = JobStore::new(Uuid::nil(), jobs.clone()).unwrap();
        let overrides = BTreeSet::from(["a".to_string()]);
        assert!(block_dependents(&store, &jobs, &overrides).is_empty());
    }

    #[test]
    fn report_lists_are_sorted_and_explained() {
        let mut failed = job("z-fail", &[], JobStatus::Failed);
        failed.failure_reason = Some(FailureReason::Timeout { secs: 5 });
        let mut blocked = job("b", &["z-fail"], JobStatus::Blocked);
        blocked.blocked_by = Some("z-fail".to_string());
        let jobs = vec![
            job("m", &[], JobStatus::Completed),
            job("c", &[], JobStatus::Completed),
            failed,
            blocked,
            job("s", &[], JobStatus::Suspended),
            job("p", &[], JobStatus::Pending),
        ];
        let suspended = vec![SuspendedJob {
            execution_id: Uuid::nil(),
            job_id: "s".to_string(),
            checkpoint: Checkpoint::human_action(json!("sign in")),
            suspended_at: chrono::Utc::now(),
        }];
        let header = ReportHeader {
            execution_id: Uuid::nil(),
            state: OrchestratorState::AwaitingCheckpoint(0),
            decision: Decision::Continue,
            waves_total: 2,
            current_wave: Some(0),
            rejected_responses: Vec::new(),
        };

        let report = build_report(header, &jobs, &suspended);

        assert_eq!(report.completed, vec!["c".to_string(), "m".to_string()]);
        assert_eq!(report.failure_of("z-fail"), Some(&FailureReason::Timeout { secs: 5 }));
        assert_eq!(report.blocked_by("b"), Some("z-fail"));
        assert_eq!(report.suspended_count(), 1);
        assert_eq!(report.pending, vec!["p".to_string()]);
        assert!(report.needs_response());
    }
}
