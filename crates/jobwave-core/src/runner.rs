//! Job runner port.
//!
//! The runner is the collaborator that actually performs a job's work. The
//! scheduler never assumes what that means: it hands over the job (and, on
//! resume, the stored snapshot plus the human response) and receives a tagged
//! `JobOutcome` back. Runners must be re-entrant from any stored
//! `ResumeState`; a resumed invocation is always a fresh call.

use std::future::Future;

use jobwave_types::checkpoint::ResumeInput;
use jobwave_types::job::{Job, JobOutcome};
use serde_json::Value;

/// Performs the work of a job.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait JobRunner: Send + Sync {
    /// Run `job`. `resume` is `Some` when continuing from a checkpoint.
    fn run(
        &self,
        job: &Job,
        resume: Option<ResumeInput>,
    ) -> impl Future<Output = JobOutcome> + Send;
}

// ---------------------------------------------------------------------------
// Claim verification decorator
// ---------------------------------------------------------------------------

/// Checks a runner's self-reported result before the scheduler trusts it.
pub trait ClaimVerifier: Send + Sync {
    /// `Err(reason)` rejects the claimed completion.
    fn verify(
        &self,
        job: &Job,
        result: &Value,
    ) -> impl Future<Output = Result<(), String>> + Send;
}

/// Wraps a runner so that every claimed completion is verified.
///
/// A completion that fails verification becomes a failure; failures and
/// suspensions pass through untouched.
#[derive(Debug, Clone)]
pub struct VerifyingRunner<R, V> {
    inner: R,
    verifier: V,
}

impl<R, V> VerifyingRunner<R, V> {
    pub fn new(inner: R, verifier: V) -> Self {
        Self { inner, verifier }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: JobRunner, V: ClaimVerifier> JobRunner for VerifyingRunner<R, V> {
    async fn run(&self, job: &Job, resume: Option<ResumeInput>) -> JobOutcome {
        match self.inner.run(job, resume).await {
            JobOutcome::Completed { result } => match self.verifier.verify(job, &result).await {
                Ok(()) => JobOutcome::Completed { result },
                Err(reason) => {
                    tracing::warn!(
                        job_id = job.id.as_str(),
                        %reason,
                        "claimed completion rejected"
                    );
                    JobOutcome::failed(format!("verification failed: {reason}"))
                }
            },
            other => other,
        }
    }
}
