//! Checkpoint controller: suspends jobs at declared checkpoints and resumes
//! them from persisted snapshots.
//!
//! A suspended job holds no task. Everything needed to continue it lives in
//! the `SuspendedJob` snapshot written through `JobRepository`, so a resume
//! may happen in a different process long after the suspension. Resuming is
//! always a fresh runner invocation fed with the stored `ResumeState` and the
//! human response.

use std::sync::Arc;

use chrono::Utc;
use jobwave_types::checkpoint::{
    Checkpoint, CheckpointKind, HumanResponse, ResumeInput, SuspendedJob,
};
use jobwave_types::config::SchedulerConfig;
use jobwave_types::event::SchedulerEvent;
use jobwave_types::job::{Job, JobOutcome, JobResult, JobStatus};

use crate::event::EventBus;
use crate::executor::WaveExecutor;
use crate::repository::JobRepository;
use crate::runner::JobRunner;
use crate::store::{JobStore, StoreError};

// ---------------------------------------------------------------------------
// CheckpointError
// ---------------------------------------------------------------------------

/// Errors from checkpoint operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    /// The response does not fit the checkpoint kind. Nothing was mutated.
    #[error("'{response}' response does not fit a {kind} checkpoint: {detail}")]
    ResponseMismatch {
        kind: CheckpointKind,
        response: &'static str,
        detail: String,
    },

    #[error("job '{0}' is not suspended")]
    NotSuspended(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckpointError {
    /// Whether the error is the caller's fault and can be retried with a
    /// corrected response.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ResponseMismatch { .. } | Self::NotSuspended(_))
    }
}

// ---------------------------------------------------------------------------
// Response validation
// ---------------------------------------------------------------------------

/// Check that `response` has the shape `checkpoint.kind` expects.
pub fn validate(checkpoint: &Checkpoint, response: &HumanResponse) -> Result<(), CheckpointError> {
    let mismatch = |detail: &str| CheckpointError::ResponseMismatch {
        kind: checkpoint.kind,
        response: response.label(),
        detail: detail.to_string(),
    };

    match (checkpoint.kind, response) {
        (CheckpointKind::HumanVerify, HumanResponse::Approved) => Ok(()),
        (CheckpointKind::HumanVerify, HumanResponse::Issue { description }) => {
            if description.trim().is_empty() {
                Err(mismatch("issue description is empty"))
            } else {
                Ok(())
            }
        }
        (CheckpointKind::HumanVerify, _) => Err(mismatch("expected approval or an issue")),

        (CheckpointKind::Decision, HumanResponse::Selected { option }) => {
            if checkpoint.options.is_empty() || checkpoint.options.contains(option) {
                Ok(())
            } else {
                Err(mismatch(&format!(
                    "'{option}' is not one of [{}]",
                    checkpoint.options.join(", ")
                )))
            }
        }
        (CheckpointKind::Decision, _) => Err(mismatch("expected a selected option")),

        (CheckpointKind::HumanAction, HumanResponse::Acknowledged { .. }) => Ok(()),
        (CheckpointKind::HumanAction, _) => Err(mismatch("expected an acknowledgement")),
    }
}

// ---------------------------------------------------------------------------
// CheckpointController
// ---------------------------------------------------------------------------

/// Owns the suspended-job snapshots of one execution unit.
///
/// Generic over `Repo: JobRepository` so it works with any storage backend.
/// Every snapshot is persisted before the job's status changes, so a crash in
/// between leaves a harmless extra snapshot rather than a suspended job with
/// nothing to resume from.
pub struct CheckpointController<Repo> {
    repo: Arc<Repo>,
    store: Arc<JobStore>,
    event_bus: EventBus,
    default_decision_option: Option<String>,
}

impl<Repo: JobRepository> CheckpointController<Repo> {
    pub fn new(
        repo: Arc<Repo>,
        store: Arc<JobStore>,
        event_bus: EventBus,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            store,
            event_bus,
            default_decision_option: config.default_decision_option.clone(),
        }
    }

    pub fn repo(&self) -> &Arc<Repo> {
        &self.repo
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Persist the current snapshot of a job.
    pub async fn record_job(&self, job: &Job) -> Result<(), CheckpointError> {
        self.repo
            .save_job(&self.store.execution_id(), job)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Persist `checkpoint` for a running job and mark it Suspended.
    pub async fn suspend(
        &self,
        job_id: &str,
        checkpoint: Checkpoint,
    ) -> Result<SuspendedJob, CheckpointError> {
        let execution_id = self.store.execution_id();
        let kind = checkpoint.kind;
        let suspended = SuspendedJob {
            execution_id,
            job_id: job_id.to_string(),
            checkpoint,
            suspended_at: Utc::now(),
        };

        self.repo
            .save_suspended(&suspended)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        let job = self.store.record_outcome(
            job_id,
            &JobOutcome::Suspended {
                checkpoint: suspended.checkpoint.clone(),
            },
        )?;
        self.record_job(&job).await?;

        self.event_bus.publish(SchedulerEvent::JobSuspended {
            execution_id,
            job_id: job_id.to_string(),
            kind,
        });
        tracing::info!(
            execution_id = %execution_id,
            job_id,
            kind = kind.as_str(),
            "job suspended at checkpoint"
        );

        Ok(suspended)
    }

    /// The response non-interactive mode would give, if any.
    ///
    /// Human-action checkpoints are never auto-resolved.
    pub fn auto_response(&self, checkpoint: &Checkpoint) -> Option<HumanResponse> {
        match checkpoint.kind {
            CheckpointKind::HumanVerify => Some(HumanResponse::Approved),
            CheckpointKind::Decision => {
                let allowed = |option: &str| {
                    checkpoint.options.is_empty() || checkpoint.options.iter().any(|o| o == option)
                };
                checkpoint
                    .default_option
                    .as_deref()
                    .filter(|option| allowed(*option))
                    .or_else(|| {
                        self.default_decision_option
                            .as_deref()
                            .filter(|option| allowed(*option))
                    })
                    .map(|option| HumanResponse::Selected {
                        option: option.to_string(),
                    })
            }
            CheckpointKind::HumanAction => None,
        }
    }

    /// Resume a suspended job with `response`.
    ///
    /// Validation happens before anything changes: a mismatched response
    /// leaves the job Suspended and its snapshot in place. On success the
    /// runner is invoked again through `executor`; the snapshot is deleted
    /// once the job reaches a terminal status and replaced if it suspends
    /// again.
    pub async fn resume<R>(
        &self,
        executor: &WaveExecutor<R, Repo>,
        job_id: &str,
        response: HumanResponse,
        auto_resolved: bool,
    ) -> Result<JobResult, CheckpointError>
    where
        R: JobRunner + 'static,
        Repo: 'static,
    {
        let execution_id = self.store.execution_id();

        let suspended = self
            .repo
            .get_suspended(&execution_id, job_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or_else(|| CheckpointError::NotSuspended(job_id.to_string()))?;

        if self.store.status(job_id) != Some(JobStatus::Suspended) {
            return Err(CheckpointError::NotSuspended(job_id.to_string()));
        }

        if let Err(e) = validate(&suspended.checkpoint, &response) {
            tracing::warn!(
                execution_id = %execution_id,
                job_id,
                error = %e,
                "checkpoint response rejected"
            );
            return Err(e);
        }

        let job = self.store.resume(job_id)?;
        self.event_bus.publish(SchedulerEvent::JobResumed {
            execution_id,
            job_id: job_id.to_string(),
            auto_resolved,
        });
        tracing::info!(
            execution_id = %execution_id,
            job_id,
            response = response.label(),
            auto_resolved,
            "resuming job"
        );

        let input = ResumeInput {
            state: suspended.checkpoint.resume_state.clone(),
            response,
        };
        let result = executor.invoke(job, Some(input)).await?;

        if result.outcome.status().is_terminal() {
            self.repo
                .delete_suspended(&execution_id, job_id)
                .await
                .map_err(|e| CheckpointError::Repository(e.to_string()))?;
        }

        Ok(result)
    }
}
