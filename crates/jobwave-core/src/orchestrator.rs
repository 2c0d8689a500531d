//! Orchestrator: drives an execution unit wave by wave and owns the run state
//! machine.
//!
//! ```text
//! Initializing -> RunningWave(n) -> AwaitingCheckpoint(n) -> (resume) -> RunningWave(n)
//!                       |
//!                       +-> Aggregating(n) -> RunningWave(n+1) | Completed | Halted
//! ```
//!
//! Every transition is persisted through `JobRepository` before the run moves
//! on, logged, and published as `SchedulerEvent::StateChanged`. Because all
//! state lives in the repository, a fresh `Orchestrator` (for instance in a
//! new process) can continue any execution with `resume_execution`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use jobwave_types::checkpoint::HumanResponse;
use jobwave_types::config::{ExecuteOptions, SchedulerConfig};
use jobwave_types::error::RepositoryError;
use jobwave_types::event::SchedulerEvent;
use jobwave_types::execution::ExecutionRecord;
use jobwave_types::job::{Job, JobStatus, Wave};
use jobwave_types::report::{Decision, HaltReason, OrchestratorState, RejectedResponse, RunReport};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator::{ReportHeader, aggregate, block_dependents, build_report};
use crate::checkpoint::{CheckpointController, CheckpointError};
use crate::event::EventBus;
use crate::executor::{ExecutorError, WaveExecutor};
use crate::graph::{GraphError, partition_into_waves};
use crate::repository::JobRepository;
use crate::runner::JobRunner;
use crate::store::{JobStore, StoreError};

// ---------------------------------------------------------------------------
// OrchestratorError
// ---------------------------------------------------------------------------

/// Errors surfaced by orchestrator operations.
///
/// Job failures and rejected checkpoint responses are not errors; they show
/// up in the returned `RunReport`.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid job set: {0}")]
    Graph(#[from] GraphError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("job '{0}' not found in execution")]
    JobNotFound(String),

    #[error("job '{job}' is {status}; only failed jobs can be overridden")]
    NotFailed { job: String, status: JobStatus },
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Working state of one `execute` / `resume_execution` call.
struct Run<R, Repo> {
    record: ExecutionRecord,
    waves: Vec<Wave>,
    config: SchedulerConfig,
    store: Arc<JobStore>,
    checkpoints: Arc<CheckpointController<Repo>>,
    executor: WaveExecutor<R, Repo>,
    stop: CancellationToken,
    decision: Decision,
    current_wave: Option<u32>,
    rejected: Vec<RejectedResponse>,
}

impl<R, Repo> Run<R, Repo> {
    fn execution_id(&self) -> Uuid {
        self.record.id
    }

    fn wave_has_status(&self, wave: &Wave, status: JobStatus) -> bool {
        wave.job_ids
            .iter()
            .any(|id| self.store.status(id) == Some(status))
    }

    /// Position of the wave the run should re-enter.
    ///
    /// The earliest of: the wave recorded in the persisted state (so a wave
    /// interrupted before aggregation is aggregated), and the first wave
    /// still holding an incomplete job.
    fn resume_position(&self) -> usize {
        let position_of = |index: u32| self.waves.iter().position(|w| w.index == index);

        let recorded = self
            .record
            .state
            .wave()
            .or_else(|| self.record.last_report.as_ref().and_then(|r| r.current_wave))
            .and_then(position_of);

        let first_incomplete = self.waves.iter().position(|wave| {
            wave.job_ids
                .iter()
                .any(|id| self.store.status(id).is_some_and(|s| !s.is_terminal()))
        });

        [recorded, first_incomplete]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Entry point of the scheduler.
///
/// Generic over the job runner and the repository. Holds no per-run state
/// besides the stop tokens of runs in flight, so one instance can drive any
/// number of executions.
pub struct Orchestrator<R, Repo> {
    runner: Arc<R>,
    repo: Arc<Repo>,
    config: SchedulerConfig,
    event_bus: EventBus,
    /// Stop tokens keyed by execution ID, present while the run is in flight.
    stop_tokens: DashMap<Uuid, CancellationToken>,
}

impl<R, Repo> Orchestrator<R, Repo>
where
    R: JobRunner + 'static,
    Repo: JobRepository + 'static,
{
    pub fn new(runner: R, repo: Repo, config: SchedulerConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            repo: Arc::new(repo),
            event_bus: EventBus::new(config.event_capacity),
            config,
            stop_tokens: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Receive every lifecycle event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_bus.subscribe()
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Run `jobs` as a new execution unit.
    ///
    /// The job set is partitioned before anything is persisted, so a cycle or
    /// unknown dependency fails the call with no state left behind.
    pub async fn execute(
        &self,
        mut jobs: Vec<Job>,
        options: ExecuteOptions,
    ) -> Result<RunReport, OrchestratorError> {
        for job in &mut jobs {
            job.reset();
        }
        let waves = partition_into_waves(&jobs, &options.satisfied_externally)?;
        let config = self.config.with_options(&options);
        let record = ExecutionRecord::new(options);

        tracing::info!(
            execution_id = %record.id,
            jobs = jobs.len(),
            waves = waves.len(),
            concurrent = config.concurrent,
            auto_resolve = config.auto_resolve,
            "starting execution"
        );

        self.repo.save_execution(&record).await?;
        self.repo.save_jobs(&record.id, &jobs).await?;

        let mut run = self.prepare(record, jobs, waves, config)?;
        let result = self.drive(&mut run, 0).await;
        self.stop_tokens.remove(&run.execution_id());
        result
    }

    /// Continue a paused, halted, or interrupted execution.
    ///
    /// `responses` answer suspended checkpoints by job ID. A response that
    /// does not fit its checkpoint is listed in `rejected_responses` and the
    /// job stays suspended. With no responses and nothing suspended, a
    /// completed run or one halted on failures is returned untouched.
    pub async fn resume_execution(
        &self,
        execution_id: Uuid,
        responses: HashMap<String, HumanResponse>,
    ) -> Result<RunReport, OrchestratorError> {
        let record = self.load_record(execution_id).await?;
        let jobs = self.repo.list_jobs(&execution_id).await?;
        let suspended = self.repo.list_suspended(&execution_id).await?;

        let settled = matches!(
            record.state,
            OrchestratorState::Completed
                | OrchestratorState::Halted(HaltReason::FailureReview)
                | OrchestratorState::Halted(HaltReason::Systemic)
        );
        if responses.is_empty() && suspended.is_empty() && settled {
            tracing::debug!(
                execution_id = %execution_id,
                state = %record.state,
                "nothing to resume"
            );
            return match record.last_report {
                Some(report) => Ok(report),
                None => self.report(execution_id).await,
            };
        }

        let config = self.config.with_options(&record.options);
        let waves = partition_into_waves(&jobs, &record.options.satisfied_externally)?;

        tracing::info!(
            execution_id = %execution_id,
            state = %record.state,
            responses = responses.len(),
            suspended = suspended.len(),
            "resuming execution"
        );

        let mut run = self.prepare(record, jobs, waves, config)?;
        let result = self.continue_run(&mut run, responses).await;
        self.stop_tokens.remove(&execution_id);
        result
    }

    /// Accept the failure of `job_id`: its dependents are unblocked and the
    /// run becomes resumable.
    pub async fn override_failure(
        &self,
        execution_id: Uuid,
        job_id: &str,
    ) -> Result<RunReport, OrchestratorError> {
        let mut record = self.load_record(execution_id).await?;
        let jobs = self.repo.list_jobs(&execution_id).await?;

        let job = jobs
            .iter()
            .find(|j| j.id == job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        if job.status != JobStatus::Failed {
            return Err(OrchestratorError::NotFailed {
                job: job_id.to_string(),
                status: job.status,
            });
        }

        let waves_total = partition_into_waves(&jobs, &record.options.satisfied_externally)?.len();
        record.overrides.insert(job_id.to_string());

        let store = JobStore::new(execution_id, jobs)?;
        let released = store.unblock_all();
        let reblocked = block_dependents(&store, &store.snapshot(), &record.overrides);
        let jobs = store.snapshot();
        self.repo.save_jobs(&execution_id, &jobs).await?;

        let current_wave = record.last_report.as_ref().and_then(|r| r.current_wave);
        let from = record.state;
        if matches!(
            from,
            OrchestratorState::Completed
                | OrchestratorState::Halted(HaltReason::FailureReview)
                | OrchestratorState::Halted(HaltReason::Systemic)
        ) {
            record.set_state(OrchestratorState::RunningWave(current_wave.unwrap_or(0)));
            self.event_bus.publish(SchedulerEvent::StateChanged {
                execution_id,
                from,
                to: record.state,
            });
        }

        let suspended = self.repo.list_suspended(&execution_id).await?;
        let report = build_report(
            ReportHeader {
                execution_id,
                state: record.state,
                decision: Decision::Continue,
                waves_total: waves_total as u32,
                current_wave,
                rejected_responses: Vec::new(),
            },
            &jobs,
            &suspended,
        );
        record.last_report = Some(report.clone());
        self.repo.save_execution(&record).await?;

        tracing::info!(
            execution_id = %execution_id,
            job_id,
            released = released.len(),
            reblocked = reblocked.len(),
            state = %record.state,
            "failure overridden"
        );

        Ok(report)
    }

    /// Ask every run in flight to stop: running jobs finish, nothing new
    /// starts, and the run halts. Returns how many runs were signalled.
    pub fn request_stop(&self) -> usize {
        let mut signalled = 0;
        for entry in self.stop_tokens.iter() {
            entry.value().cancel();
            signalled += 1;
        }
        if signalled > 0 {
            tracing::info!(runs = signalled, "stop requested");
        }
        signalled
    }

    /// Stop a single run in flight. Returns `false` if it is not running here.
    pub fn request_stop_for(&self, execution_id: Uuid) -> bool {
        match self.stop_tokens.get(&execution_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(execution_id = %execution_id, "stop requested");
                true
            }
            None => false,
        }
    }

    /// Current report of an execution, rebuilt from persisted state.
    pub async fn report(&self, execution_id: Uuid) -> Result<RunReport, OrchestratorError> {
        let record = self.load_record(execution_id).await?;
        let jobs = self.repo.list_jobs(&execution_id).await?;
        let suspended = self.repo.list_suspended(&execution_id).await?;
        let waves = partition_into_waves(&jobs, &record.options.satisfied_externally)?;

        let (decision, current_wave, rejected) = match &record.last_report {
            Some(last) => (last.decision, last.current_wave, last.rejected_responses.clone()),
            None => (Decision::Continue, record.state.wave(), Vec::new()),
        };

        Ok(build_report(
            ReportHeader {
                execution_id,
                state: record.state,
                decision,
                waves_total: waves.len() as u32,
                current_wave,
                rejected_responses: rejected,
            },
            &jobs,
            &suspended,
        ))
    }

    /// The wave partition of a persisted execution.
    pub async fn waves(&self, execution_id: Uuid) -> Result<Vec<Wave>, OrchestratorError> {
        let record = self.load_record(execution_id).await?;
        let jobs = self.repo.list_jobs(&execution_id).await?;
        Ok(partition_into_waves(&jobs, &record.options.satisfied_externally)?)
    }

    // -----------------------------------------------------------------------
    // Run driving
    // -----------------------------------------------------------------------

    async fn load_record(&self, execution_id: Uuid) -> Result<ExecutionRecord, OrchestratorError> {
        self.repo
            .get_execution(&execution_id)
            .await?
            .ok_or(OrchestratorError::ExecutionNotFound(execution_id))
    }

    fn prepare(
        &self,
        record: ExecutionRecord,
        jobs: Vec<Job>,
        waves: Vec<Wave>,
        config: SchedulerConfig,
    ) -> Result<Run<R, Repo>, OrchestratorError> {
        let store = Arc::new(JobStore::new(record.id, jobs)?);
        let checkpoints = Arc::new(CheckpointController::new(
            Arc::clone(&self.repo),
            Arc::clone(&store),
            self.event_bus.clone(),
            &config,
        ));

        let stop = CancellationToken::new();
        self.stop_tokens.insert(record.id, stop.clone());

        let executor = WaveExecutor::new(
            Arc::clone(&self.runner),
            Arc::clone(&checkpoints),
            self.event_bus.clone(),
            &config,
        )
        .with_overrides(record.overrides.clone())
        .with_stop_token(stop.clone());

        let (decision, current_wave) = record
            .last_report
            .as_ref()
            .map(|r| (r.decision, r.current_wave))
            .unwrap_or((Decision::Continue, None));

        Ok(Run {
            record,
            waves,
            config,
            store,
            checkpoints,
            executor,
            stop,
            decision,
            current_wave,
            rejected: Vec::new(),
        })
    }

    async fn continue_run(
        &self,
        run: &mut Run<R, Repo>,
        responses: HashMap<String, HumanResponse>,
    ) -> Result<RunReport, OrchestratorError> {
        let execution_id = run.execution_id();

        let interrupted = run.store.reset_interrupted();
        if !interrupted.is_empty() {
            tracing::warn!(
                execution_id = %execution_id,
                jobs = ?interrupted,
                "resetting jobs left running by an interrupted run"
            );
            self.repo.save_jobs(&execution_id, &run.store.snapshot()).await?;
        }

        let start = run.resume_position();

        if !responses.is_empty() {
            if let Some(index) = run.waves.get(start).map(|w| w.index) {
                run.current_wave = Some(index);
                self.transition(run, OrchestratorState::RunningWave(index)).await?;
            }

            let mut responses: Vec<(String, HumanResponse)> = responses.into_iter().collect();
            responses.sort_by(|a, b| a.0.cmp(&b.0));

            for (job_id, response) in responses {
                match run
                    .checkpoints
                    .resume(&run.executor, &job_id, response, false)
                    .await
                {
                    Ok(result) => {
                        tracing::debug!(
                            execution_id = %execution_id,
                            job_id = job_id.as_str(),
                            status = %result.outcome.status(),
                            "checkpoint answered"
                        );
                    }
                    Err(e) if e.is_rejection() => {
                        self.event_bus.publish(SchedulerEvent::ResponseRejected {
                            execution_id,
                            job_id: job_id.clone(),
                            error: e.to_string(),
                        });
                        run.rejected.push(RejectedResponse {
                            job_id,
                            error: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.drive(run, start).await
    }

    /// Run waves from `start` until the run completes, halts, or waits on a
    /// checkpoint.
    async fn drive(
        &self,
        run: &mut Run<R, Repo>,
        start: usize,
    ) -> Result<RunReport, OrchestratorError> {
        let execution_id = run.execution_id();

        for position in start..run.waves.len() {
            let wave = run.waves[position].clone();
            run.current_wave = Some(wave.index);

            if run.stop.is_cancelled() {
                return self.halt(run, HaltReason::StopRequested).await;
            }

            self.transition(run, OrchestratorState::RunningWave(wave.index))
                .await?;
            self.propagate_blocks(run).await?;

            let eligible = wave
                .job_ids
                .iter()
                .filter(|id| run.store.status(id) == Some(JobStatus::Pending))
                .count();
            self.event_bus.publish(SchedulerEvent::WaveStarted {
                execution_id,
                wave: wave.index,
                jobs: eligible,
            });
            tracing::info!(
                execution_id = %execution_id,
                wave = wave.index,
                jobs = eligible,
                "wave started"
            );

            run.executor.run_wave(&wave).await?;

            if run.config.auto_resolve {
                self.auto_resolve(run).await?;
            }

            if run.stop.is_cancelled() {
                return self.halt(run, HaltReason::StopRequested).await;
            }

            if run.wave_has_status(&wave, JobStatus::Suspended) {
                self.transition(run, OrchestratorState::AwaitingCheckpoint(wave.index))
                    .await?;
                return self.finish(run).await;
            }

            self.transition(run, OrchestratorState::Aggregating(wave.index))
                .await?;
            let summary = aggregate(
                &wave,
                &run.store.snapshot(),
                run.config.failure_policy,
                &run.record.overrides,
            );
            run.decision = summary.decision;
            self.propagate_blocks(run).await?;

            self.event_bus.publish(SchedulerEvent::WaveFinished {
                execution_id,
                wave: wave.index,
                completed: summary.completed,
                failed: summary.failed,
                suspended: summary.suspended,
                decision: summary.decision,
            });
            tracing::info!(
                execution_id = %execution_id,
                wave = wave.index,
                completed = summary.completed,
                failed = summary.failed,
                successful = summary.successful,
                decision = %summary.decision,
                "wave finished"
            );

            match summary.decision {
                Decision::Continue if run.wave_has_status(&wave, JobStatus::Pending) => {
                    tracing::warn!(
                        execution_id = %execution_id,
                        wave = wave.index,
                        "fail-fast left jobs unstarted, halting run"
                    );
                    return self.halt(run, HaltReason::FailFast).await;
                }
                Decision::Continue => {}
                Decision::HaltForReview => {
                    return self.halt(run, HaltReason::FailureReview).await;
                }
                Decision::StopSystemic => {
                    tracing::warn!(
                        execution_id = %execution_id,
                        wave = wave.index,
                        "every job in the wave failed, stopping run"
                    );
                    return self.halt(run, HaltReason::Systemic).await;
                }
            }
        }

        self.transition(run, OrchestratorState::Completed).await?;
        self.finish(run).await
    }

    /// Answer suspended checkpoints automatically until nothing more can be
    /// resolved. Each job is auto-resumed at most `max_auto_resolutions`
    /// times per call.
    async fn auto_resolve(&self, run: &mut Run<R, Repo>) -> Result<(), OrchestratorError> {
        let execution_id = run.execution_id();
        let mut rounds: HashMap<String, u32> = HashMap::new();

        loop {
            let mut progressed = false;

            for snapshot in self.repo.list_suspended(&execution_id).await? {
                let used = rounds.entry(snapshot.job_id.clone()).or_insert(0);
                if *used >= run.config.max_auto_resolutions {
                    tracing::warn!(
                        execution_id = %execution_id,
                        job_id = snapshot.job_id.as_str(),
                        limit = run.config.max_auto_resolutions,
                        "auto-resolution limit reached"
                    );
                    continue;
                }
                let Some(response) = run.checkpoints.auto_response(&snapshot.checkpoint) else {
                    continue;
                };
                *used += 1;

                match run
                    .checkpoints
                    .resume(&run.executor, &snapshot.job_id, response, true)
                    .await
                {
                    Ok(_) => progressed = true,
                    Err(e) if e.is_rejection() => {
                        tracing::warn!(
                            execution_id = %execution_id,
                            job_id = snapshot.job_id.as_str(),
                            error = %e,
                            "auto-resolution rejected"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    /// Block dependents of unresolved failures and persist the result.
    async fn propagate_blocks(&self, run: &Run<R, Repo>) -> Result<(), OrchestratorError> {
        let execution_id = run.execution_id();
        let blocked = block_dependents(&run.store, &run.store.snapshot(), &run.record.overrides);
        if blocked.is_empty() {
            return Ok(());
        }

        for entry in &blocked {
            self.event_bus.publish(SchedulerEvent::JobBlocked {
                execution_id,
                job_id: entry.job_id.clone(),
                blocked_by: entry.blocked_by.clone(),
            });
            tracing::info!(
                execution_id = %execution_id,
                job_id = entry.job_id.as_str(),
                blocked_by = entry.blocked_by.as_str(),
                "job blocked by failed ancestor"
            );
        }

        self.repo.save_jobs(&execution_id, &run.store.snapshot()).await?;
        Ok(())
    }

    async fn transition(
        &self,
        run: &mut Run<R, Repo>,
        to: OrchestratorState,
    ) -> Result<(), OrchestratorError> {
        let from = run.record.state;
        if from == to {
            return Ok(());
        }

        run.record.set_state(to);
        self.repo.save_execution(&run.record).await?;

        self.event_bus.publish(SchedulerEvent::StateChanged {
            execution_id: run.execution_id(),
            from,
            to,
        });
        tracing::info!(
            execution_id = %run.execution_id(),
            from = %from,
            to = %to,
            "state changed"
        );
        Ok(())
    }

    async fn halt(
        &self,
        run: &mut Run<R, Repo>,
        reason: HaltReason,
    ) -> Result<RunReport, OrchestratorError> {
        self.transition(run, OrchestratorState::Halted(reason)).await?;
        self.finish(run).await
    }

    /// Persist the final snapshots and the report of this call.
    async fn finish(&self, run: &mut Run<R, Repo>) -> Result<RunReport, OrchestratorError> {
        let execution_id = run.execution_id();
        let jobs = run.store.snapshot();
        self.repo.save_jobs(&execution_id, &jobs).await?;
        let suspended = self.repo.list_suspended(&execution_id).await?;

        let report = build_report(
            ReportHeader {
                execution_id,
                state: run.record.state,
                decision: run.decision,
                waves_total: run.waves.len() as u32,
                current_wave: run.current_wave,
                rejected_responses: std::mem::take(&mut run.rejected),
            },
            &jobs,
            &suspended,
        );

        run.record.last_report = Some(report.clone());
        self.repo.save_execution(&run.record).await?;

        tracing::info!(
            execution_id = %execution_id,
            state = %report.state,
            completed = report.completed_count(),
            failed = report.failed_count(),
            suspended = report.suspended_count(),
            blocked = report.blocked_count(),
            "execution paused or finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwave_types::checkpoint::{Checkpoint, ResumeInput};
    use jobwave_types::job::JobOutcome;
    use serde_json::json;

    use crate::repository::InMemoryJobRepository;

    /// Fails jobs with `fail` metadata, suspends `verify` jobs until approved.
    struct Scripted;

    impl JobRunner for Scripted {
        async fn run(&self, job: &Job, resume: Option<ResumeInput>) -> JobOutcome {
            if job.metadata.contains_key("fail") {
                return JobOutcome::failed("scripted failure");
            }
            if job.metadata.contains_key("verify") && resume.is_none() {
                return JobOutcome::suspended(Checkpoint::human_verify(json!("check output")));
            }
            JobOutcome::completed(json!(job.id))
        }
    }

    fn orchestrator() -> Orchestrator<Scripted, InMemoryJobRepository> {
        Orchestrator::new(Scripted, InMemoryJobRepository::new(), SchedulerConfig::default())
    }

    #[tokio::test]
    async fn empty_job_set_completes() {
        let report = orchestrator()
            .execute(Vec::new(), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(report.state, OrchestratorState::Completed);
        assert_eq!(report.waves_total, 0);
    }

    #[tokio::test]
    async fn construction_error_persists_nothing() {
        let orch = orchestrator();
        let jobs = vec![Job::new("a").depends_on(["ghost"])];
        let err = orch.execute(jobs, ExecuteOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Graph(GraphError::UnknownDependency { .. })
        ));
        assert!(orch.repo().list_executions(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_changes_are_published_in_order() {
        let orch = orchestrator();
        let mut rx = orch.subscribe();
        let jobs = vec![Job::new("a"), Job::new("b").depends_on(["a"])];

        orch.execute(jobs, ExecuteOptions::default()).await.unwrap();

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SchedulerEvent::StateChanged { to, .. } = event {
                states.push(to);
            }
        }
        assert_eq!(
            states,
            vec![
                OrchestratorState::RunningWave(0),
                OrchestratorState::Aggregating(0),
                OrchestratorState::RunningWave(1),
                OrchestratorState::Aggregating(1),
                OrchestratorState::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn override_unblocks_and_resume_finishes() {
        let orch = orchestrator();
        let jobs = vec![
            Job::new("a").with_metadata("fail", json!(true)),
            Job::new("b").depends_on(["a"]),
        ];
        let report = orch.execute(jobs, ExecuteOptions::default()).await.unwrap();
        assert_eq!(report.state, OrchestratorState::Halted(HaltReason::FailureReview));
        assert_eq!(report.blocked_by("b"), Some("a"));

        let overridden = orch.override_failure(report.execution_id, "a").await.unwrap();
        assert_eq!(overridden.blocked_count(), 0);
        assert_eq!(overridden.state, OrchestratorState::RunningWave(0));

        let resumed = orch
            .resume_execution(report.execution_id, HashMap::new())
            .await
            .unwrap();
        assert_eq!(resumed.state, OrchestratorState::Completed);
        assert_eq!(resumed.completed, vec!["b".to_string()]);
        assert_eq!(resumed.failed_count(), 1);
    }

    #[tokio::test]
    async fn override_rejects_non_failed_job() {
        let orch = orchestrator();
        let report = orch
            .execute(vec![Job::new("a")], ExecuteOptions::default())
            .await
            .unwrap();
        let err = orch.override_failure(report.execution_id, "a").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFailed { .. }));

        let err = orch.override_failure(report.execution_id, "nope").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn auto_resolve_approves_human_verify() {
        let orch = orchestrator();
        let jobs = vec![Job::new("check").interactive().with_metadata("verify", json!(true))];

        let report = orch
            .execute(jobs, ExecuteOptions::default().with_auto_resolve(true))
            .await
            .unwrap();

        assert_eq!(report.state, OrchestratorState::Completed);
        assert_eq!(report.completed, vec!["check".to_string()]);
    }

    #[tokio::test]
    async fn unknown_execution_is_an_error() {
        let err = orchestrator()
            .resume_execution(Uuid::now_v7(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ExecutionNotFound(_)));
    }

    #[tokio::test]
    async fn report_matches_last_returned_report() {
        let orch = orchestrator();
        let jobs = vec![Job::new("a"), Job::new("b").with_metadata("verify", json!(true))];
        let returned = orch.execute(jobs, ExecuteOptions::default()).await.unwrap();
        assert!(returned.needs_response());

        let rebuilt = orch.report(returned.execution_id).await.unwrap();
        assert_eq!(rebuilt, returned);
    }
}
