//! Job repository trait definition.
//!
//! Defines the storage interface for execution records, job snapshots, and
//! suspended-job snapshots. The infrastructure layer (jobwave-infra)
//! implements this trait with SQLite persistence.

use jobwave_types::checkpoint::SuspendedJob;
use jobwave_types::error::RepositoryError;
use jobwave_types::execution::ExecutionRecord;
use jobwave_types::job::Job;
use uuid::Uuid;

/// Repository trait for scheduler persistence.
///
/// Covers three entity families, all keyed by execution ID:
/// - **Executions:** the execution record (options, state, overrides, last report).
/// - **Jobs:** job definitions plus their current status, in input order.
/// - **Suspensions:** checkpoint snapshots of suspended jobs.
///
/// Every write is an upsert: re-saving the same state must be harmless, so
/// callers may retry writes after a crash without checking what landed.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait JobRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Insert or replace an execution record.
    fn save_execution(
        &self,
        record: &ExecutionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution record by ID.
    fn get_execution(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionRecord>, RepositoryError>> + Send;

    /// List execution records, most recent first.
    fn list_executions(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionRecord>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Insert or replace all jobs of an execution, preserving their order.
    fn save_jobs(
        &self,
        execution_id: &Uuid,
        jobs: &[Job],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert or replace a single job.
    fn save_job(
        &self,
        execution_id: &Uuid,
        job: &Job,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All jobs of an execution, in their original order.
    fn list_jobs(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Job>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Suspensions
    // -----------------------------------------------------------------------

    /// Insert or replace the snapshot of a suspended job.
    fn save_suspended(
        &self,
        suspended: &SuspendedJob,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get the snapshot of a suspended job.
    fn get_suspended(
        &self,
        execution_id: &Uuid,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<SuspendedJob>, RepositoryError>> + Send;

    /// All suspended-job snapshots of an execution, oldest first.
    fn list_suspended(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<SuspendedJob>, RepositoryError>> + Send;

    /// Delete a snapshot. Returns `true` if it existed.
    fn delete_suspended(
        &self,
        execution_id: &Uuid,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
