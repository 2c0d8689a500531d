//! Job store: the single source of truth for job status within an execution.
//!
//! Backed by a `DashMap`, so sibling jobs running concurrently in one wave
//! transition their own entries without a store-wide lock. Every status
//! change goes through a compare-and-set on the expected current status; a
//! caller that loses a race gets `StoreError::InvalidTransition` and must not
//! act on the job.

use std::collections::{BTreeSet, HashSet};

use dashmap::DashMap;
use jobwave_types::job::{Job, JobOutcome, JobStatus};
use uuid::Uuid;

/// Errors from job store transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error("duplicate job '{0}'")]
    DuplicateJob(String),

    #[error("job '{job}' cannot move from {from} to {to}")]
    InvalidTransition {
        job: String,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Concurrent job store for one execution unit.
#[derive(Debug)]
pub struct JobStore {
    execution_id: Uuid,
    jobs: DashMap<String, Job>,
    /// Input order, for deterministic snapshots.
    order: Vec<String>,
}

impl JobStore {
    /// Create a store holding `jobs` in their given order.
    pub fn new(execution_id: Uuid, jobs: Vec<Job>) -> Result<Self, StoreError> {
        let map = DashMap::with_capacity(jobs.len());
        let mut order = Vec::with_capacity(jobs.len());
        for job in jobs {
            if map.contains_key(&job.id) {
                return Err(StoreError::DuplicateJob(job.id));
            }
            order.push(job.id.clone());
            map.insert(job.id.clone(), job);
        }
        Ok(Self {
            execution_id,
            jobs: map,
            order,
        })
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// A copy of the current job record.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|entry| entry.value().clone())
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|entry| entry.status)
    }

    /// Copies of all jobs, in input order.
    pub fn snapshot(&self) -> Vec<Job> {
        self.order.iter().filter_map(|id| self.get(id)).collect()
    }

    /// IDs of all jobs currently in `status`, in input order.
    pub fn ids_with_status(&self, status: JobStatus) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.status(id) == Some(status))
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Compare-and-set: move `job_id` to `to` if its status is one of `from`,
    /// then apply `update` while the entry is still locked.
    fn transition_with(
        &self,
        job_id: &str,
        from: &[JobStatus],
        to: JobStatus,
        update: impl FnOnce(&mut Job),
    ) -> Result<Job, StoreError> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::UnknownJob(job_id.to_string()))?;

        if !from.contains(&entry.status) {
            return Err(StoreError::InvalidTransition {
                job: job_id.to_string(),
                from: entry.status,
                to,
            });
        }

        entry.status = to;
        update(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Pending -> Running for a fresh invocation. Increments `attempts`.
    pub fn start(&self, job_id: &str) -> Result<Job, StoreError> {
        self.transition_with(job_id, &[JobStatus::Pending], JobStatus::Running, |job| {
            job.attempts += 1;
        })
    }

    /// Suspended -> Running for a resumed invocation. Increments `attempts`.
    pub fn resume(&self, job_id: &str) -> Result<Job, StoreError> {
        self.transition_with(job_id, &[JobStatus::Suspended], JobStatus::Running, |job| {
            job.attempts += 1;
        })
    }

    /// Running -> the status `outcome` maps to, recording result or failure.
    pub fn record_outcome(&self, job_id: &str, outcome: &JobOutcome) -> Result<Job, StoreError> {
        self.transition_with(job_id, &[JobStatus::Running], outcome.status(), |job| {
            match outcome {
                JobOutcome::Completed { result } => {
                    job.result = Some(result.clone());
                    job.failure_reason = None;
                }
                JobOutcome::Failed { reason } => {
                    job.result = None;
                    job.failure_reason = Some(reason.clone());
                }
                JobOutcome::Suspended { .. } => {
                    job.result = None;
                    job.failure_reason = None;
                }
            }
        })
    }

    /// Pending -> Blocked. Returns `Ok(None)` when the job is already blocked.
    pub fn block(&self, job_id: &str, blocked_by: &str) -> Result<Option<Job>, StoreError> {
        if self.status(job_id) == Some(JobStatus::Blocked) {
            return Ok(None);
        }
        self.transition_with(job_id, &[JobStatus::Pending], JobStatus::Blocked, |job| {
            job.blocked_by = Some(blocked_by.to_string());
        })
        .map(Some)
    }

    /// Blocked -> Pending for every blocked job. Returns the IDs released.
    pub fn unblock_all(&self) -> Vec<String> {
        let mut released = Vec::new();
        for id in &self.order {
            let unblocked = self
                .transition_with(id, &[JobStatus::Blocked], JobStatus::Pending, |job| {
                    job.blocked_by = None;
                })
                .is_ok();
            if unblocked {
                released.push(id.clone());
            }
        }
        released
    }

    /// Running -> Pending for jobs left running by an interrupted process.
    pub fn reset_interrupted(&self) -> Vec<String> {
        let mut reset = Vec::new();
        for id in &self.order {
            if self
                .transition_with(id, &[JobStatus::Running], JobStatus::Pending, |_| {})
                .is_ok()
            {
                reset.push(id.clone());
            }
        }
        reset
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether every dependency of `job_id` allows it to start.
    ///
    /// A dependency is satisfied when it is Completed, when it Failed but the
    /// caller overrode that failure, or when it is not part of this store
    /// (external IDs were validated when the waves were built).
    pub fn dependencies_satisfied(&self, job_id: &str, overrides: &BTreeSet<String>) -> bool {
        let Some(job) = self.get(job_id) else {
            return false;
        };
        job.depends_on.iter().all(|dep| match self.status(dep) {
            None => true,
            Some(JobStatus::Completed) => true,
            Some(JobStatus::Failed) => overrides.contains(dep),
            Some(_) => false,
        })
    }

    /// IDs of jobs that have not reached a terminal status.
    pub fn incomplete(&self) -> HashSet<String> {
        self.order
            .iter()
            .filter(|id| self.status(id).is_some_and(|s| !s.is_terminal()))
            .cloned()
            .collect()
    }
}
