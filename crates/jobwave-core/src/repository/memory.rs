//! In-process `JobRepository` backed by `DashMap`.
//!
//! Used for ephemeral runs and tests. Clones share the same maps, so a fresh
//! orchestrator built over a clone sees everything a previous one persisted.

use std::sync::Arc;

use dashmap::DashMap;
use jobwave_types::checkpoint::SuspendedJob;
use jobwave_types::error::RepositoryError;
use jobwave_types::execution::ExecutionRecord;
use jobwave_types::job::Job;
use uuid::Uuid;

use super::JobRepository;

#[derive(Debug, Default)]
struct Tables {
    executions: DashMap<Uuid, ExecutionRecord>,
    /// Jobs per execution, in input order.
    jobs: DashMap<Uuid, Vec<Job>>,
    suspended: DashMap<(Uuid, String), SuspendedJob>,
}

/// Shared in-memory repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    tables: Arc<Tables>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobRepository for InMemoryJobRepository {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        self.tables.executions.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<ExecutionRecord>, RepositoryError> {
        Ok(self
            .tables
            .executions
            .get(execution_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_executions(&self, limit: u32) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let mut records: Vec<ExecutionRecord> = self
            .tables
            .executions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn save_jobs(&self, execution_id: &Uuid, jobs: &[Job]) -> Result<(), RepositoryError> {
        let mut entry = self.tables.jobs.entry(*execution_id).or_default();
        for job in jobs {
            upsert(entry.value_mut(), job);
        }
        Ok(())
    }

    async fn save_job(&self, execution_id: &Uuid, job: &Job) -> Result<(), RepositoryError> {
        let mut entry = self.tables.jobs.entry(*execution_id).or_default();
        upsert(entry.value_mut(), job);
        Ok(())
    }

    async fn list_jobs(&self, execution_id: &Uuid) -> Result<Vec<Job>, RepositoryError> {
        Ok(self
            .tables
            .jobs
            .get(execution_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save_suspended(&self, suspended: &SuspendedJob) -> Result<(), RepositoryError> {
        self.tables.suspended.insert(
            (suspended.execution_id, suspended.job_id.clone()),
            suspended.clone(),
        );
        Ok(())
    }

    async fn get_suspended(
        &self,
        execution_id: &Uuid,
        job_id: &str,
    ) -> Result<Option<SuspendedJob>, RepositoryError> {
        Ok(self
            .tables
            .suspended
            .get(&(*execution_id, job_id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn list_suspended(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<SuspendedJob>, RepositoryError> {
        let mut snapshots: Vec<SuspendedJob> = self
            .tables
            .suspended
            .iter()
            .filter(|entry| entry.key().0 == *execution_id)
            .map(|entry| entry.value().clone())
            .collect();
        snapshots.sort_by(|a, b| {
            a.suspended_at
                .cmp(&b.suspended_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        Ok(snapshots)
    }

    async fn delete_suspended(
        &self,
        execution_id: &Uuid,
        job_id: &str,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .tables
            .suspended
            .remove(&(*execution_id, job_id.to_string()))
            .is_some())
    }
}

/// Replace the job with the same ID, or append it.
fn upsert(jobs: &mut Vec<Job>, job: &Job) {
    match jobs.iter_mut().find(|existing| existing.id == job.id) {
        Some(existing) => *existing = job.clone(),
        None => jobs.push(job.clone()),
    }
}
