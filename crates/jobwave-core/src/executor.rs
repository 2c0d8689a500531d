//! Wave executor: runs the jobs of one wave, concurrently or one at a time.
//!
//! In concurrent mode every eligible job of the wave is spawned on a
//! `tokio::JoinSet` (optionally bounded by a semaphore) and the call returns
//! only after all of them settled as Completed, Failed, or Suspended. In
//! sequential mode jobs run in wave order, optionally stopping after the first
//! failure.
//!
//! # Per-job flow
//!
//! 1. Check eligibility (Pending, dependencies satisfied) and move the job to
//!    Running through the store's compare-and-set.
//! 2. Persist the job snapshot, publish `JobStarted`.
//! 3. Invoke the runner under a timeout, catching panics.
//! 4. Record the outcome: suspensions go through the checkpoint controller,
//!    everything else straight into the store. Persist again.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use jobwave_types::checkpoint::ResumeInput;
use jobwave_types::config::SchedulerConfig;
use jobwave_types::event::SchedulerEvent;
use jobwave_types::job::{FailureReason, Job, JobOutcome, JobResult, JobStatus, Wave};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointController, CheckpointError};
use crate::event::EventBus;
use crate::repository::JobRepository;
use crate::runner::JobRunner;
use crate::store::{JobStore, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that abort a wave. Job failures are never errors; they are
/// reported as `JobOutcome::Failed`.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("task join error: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// Everything a spawned job task needs, cheaply cloneable.
struct Invoker<R, Repo> {
    runner: Arc<R>,
    store: Arc<JobStore>,
    checkpoints: Arc<CheckpointController<Repo>>,
    event_bus: EventBus,
    default_timeout_secs: u64,
}

impl<R, Repo> Clone for Invoker<R, Repo> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            store: Arc::clone(&self.store),
            checkpoints: Arc::clone(&self.checkpoints),
            event_bus: self.event_bus.clone(),
            default_timeout_secs: self.default_timeout_secs,
        }
    }
}

impl<R: JobRunner, Repo: JobRepository> Invoker<R, Repo> {
    /// Run a job that the caller already moved to Running.
    async fn invoke(
        &self,
        job: Job,
        resume: Option<ResumeInput>,
    ) -> Result<JobResult, CheckpointError> {
        let execution_id = self.store.execution_id();
        self.checkpoints.record_job(&job).await?;

        self.event_bus.publish(SchedulerEvent::JobStarted {
            execution_id,
            job_id: job.id.clone(),
            attempt: job.attempts,
        });
        tracing::debug!(
            execution_id = %execution_id,
            job_id = job.id.as_str(),
            attempt = job.attempts,
            resumed = resume.is_some(),
            "job started"
        );

        let timeout_secs = job.timeout_secs.unwrap_or(self.default_timeout_secs);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            AssertUnwindSafe(self.runner.run(&job, resume)).catch_unwind(),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => JobOutcome::Failed {
                reason: FailureReason::Panicked {
                    message: panic_message(payload.as_ref()),
                },
            },
            Err(_elapsed) => JobOutcome::Failed {
                reason: FailureReason::Timeout { secs: timeout_secs },
            },
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            JobOutcome::Suspended { checkpoint } => {
                self.checkpoints.suspend(&job.id, checkpoint.clone()).await?;
            }
            JobOutcome::Completed { .. } => {
                let updated = self.store.record_outcome(&job.id, &outcome)?;
                self.checkpoints.record_job(&updated).await?;
                self.event_bus.publish(SchedulerEvent::JobCompleted {
                    execution_id,
                    job_id: job.id.clone(),
                    duration_ms,
                });
                tracing::debug!(
                    execution_id = %execution_id,
                    job_id = job.id.as_str(),
                    duration_ms,
                    "job completed"
                );
            }
            JobOutcome::Failed { reason } => {
                let updated = self.store.record_outcome(&job.id, &outcome)?;
                self.checkpoints.record_job(&updated).await?;
                self.event_bus.publish(SchedulerEvent::JobFailed {
                    execution_id,
                    job_id: job.id.clone(),
                    reason: reason.to_string(),
                });
                tracing::warn!(
                    execution_id = %execution_id,
                    job_id = job.id.as_str(),
                    %reason,
                    "job failed"
                );
            }
        }

        Ok(JobResult {
            job_id: job.id,
            outcome,
            attempt: job.attempts,
            duration_ms,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// WaveExecutor
// ---------------------------------------------------------------------------

/// Executes waves of one execution unit.
///
/// Generic over the runner and the repository backing the checkpoint
/// controller. Built per run: it captures the overrides and stop token that
/// were in force when the run started.
pub struct WaveExecutor<R, Repo> {
    invoker: Invoker<R, Repo>,
    overrides: BTreeSet<String>,
    stop: CancellationToken,
    concurrent: bool,
    fail_fast: bool,
    max_concurrency: Option<usize>,
}

impl<R, Repo> WaveExecutor<R, Repo>
where
    R: JobRunner + 'static,
    Repo: JobRepository + 'static,
{
    pub fn new(
        runner: Arc<R>,
        checkpoints: Arc<CheckpointController<Repo>>,
        event_bus: EventBus,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            invoker: Invoker {
                runner,
                store: Arc::clone(checkpoints.store()),
                checkpoints,
                event_bus,
                default_timeout_secs: config.default_job_timeout_secs,
            },
            overrides: BTreeSet::new(),
            stop: CancellationToken::new(),
            concurrent: config.concurrent,
            fail_fast: config.fail_fast,
            max_concurrency: config.max_concurrency,
        }
    }

    /// Failed jobs whose failure the caller chose to ignore.
    pub fn with_overrides(mut self, overrides: BTreeSet<String>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Token that, once cancelled, keeps further jobs from starting.
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.invoker.store
    }

    /// Run a job already moved to Running. Shared with the checkpoint
    /// controller for resumed invocations.
    pub async fn invoke(
        &self,
        job: Job,
        resume: Option<ResumeInput>,
    ) -> Result<JobResult, CheckpointError> {
        self.invoker.invoke(job, resume).await
    }

    /// Move `job_id` to Running if it may start now.
    ///
    /// Returns `None` for jobs that are not Pending, whose dependencies are
    /// not satisfied, or that another caller started first.
    fn claim(&self, job_id: &str) -> Option<Job> {
        let store = &self.invoker.store;
        match store.status(job_id) {
            Some(JobStatus::Pending) => {}
            Some(status) => {
                tracing::debug!(job_id, %status, "skipping job");
                return None;
            }
            None => return None,
        }
        if !store.dependencies_satisfied(job_id, &self.overrides) {
            tracing::debug!(job_id, "dependencies not satisfied, skipping job");
            return None;
        }
        match store.start(job_id) {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::debug!(job_id, error = %e, "lost race to start job");
                None
            }
        }
    }

    /// Run every eligible job of `wave` and return their results in wave order.
    pub async fn run_wave(&self, wave: &Wave) -> Result<Vec<JobResult>, ExecutorError> {
        tracing::debug!(
            execution_id = %self.invoker.store.execution_id(),
            wave = wave.index,
            jobs = wave.len(),
            concurrent = self.concurrent,
            "processing wave"
        );

        if self.concurrent {
            self.run_concurrent(wave).await
        } else {
            self.run_sequential(wave).await
        }
    }

    async fn run_concurrent(&self, wave: &Wave) -> Result<Vec<JobResult>, ExecutorError> {
        let semaphore = self
            .max_concurrency
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        let mut join_set = JoinSet::new();

        for (position, job_id) in wave.job_ids.iter().enumerate() {
            let permit = match &semaphore {
                Some(semaphore) => Some(
                    Arc::clone(semaphore)
                        .acquire_owned()
                        .await
                        .map_err(|e| ExecutorError::Join(e.to_string()))?,
                ),
                None => None,
            };

            if self.stop.is_cancelled() {
                tracing::info!(wave = wave.index, "stop requested, not starting further jobs");
                break;
            }

            let Some(job) = self.claim(job_id) else {
                continue;
            };

            let invoker = self.invoker.clone();
            join_set.spawn(async move {
                let _permit = permit;
                invoker.invoke(job, None).await.map(|result| (position, result))
            });
        }

        let mut results = Vec::with_capacity(join_set.len());
        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined.map_err(|e| ExecutorError::Join(e.to_string()));
            match outcome {
                Ok(Ok(entry)) => results.push(entry),
                Ok(Err(e)) => {
                    first_error.get_or_insert(ExecutorError::Checkpoint(e));
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        // Siblings are always drained before an error is surfaced.
        if let Some(e) = first_error {
            return Err(e);
        }

        results.sort_by_key(|(position, _)| *position);
        Ok(results.into_iter().map(|(_, result)| result).collect())
    }

    async fn run_sequential(&self, wave: &Wave) -> Result<Vec<JobResult>, ExecutorError> {
        let mut results = Vec::with_capacity(wave.len());

        for job_id in &wave.job_ids {
            if self.stop.is_cancelled() {
                tracing::info!(wave = wave.index, "stop requested, not starting further jobs");
                break;
            }

            let Some(job) = self.claim(job_id) else {
                continue;
            };

            let result = self.invoker.invoke(job, None).await?;
            let failed = matches!(result.outcome, JobOutcome::Failed { .. });
            results.push(result);

            if failed && self.fail_fast {
                tracing::info!(
                    wave = wave.index,
                    job_id = job_id.as_str(),
                    "fail-fast: skipping rest of wave"
                );
                break;
            }
        }

        Ok(results)
    }
}
