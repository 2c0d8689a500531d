#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use jobwave_core::orchestrator::Orchestrator;
use jobwave_core::repository::InMemoryJobRepository;
use jobwave_core::runner::JobRunner;
use jobwave_types::checkpoint::{Checkpoint, HumanResponse, ResumeInput};
use jobwave_types::config::SchedulerConfig;
use jobwave_types::job::{Job, JobOutcome};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs are captured per test and only shown for failures (or with
/// `--nocapture`). Enable levels with e.g. `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// What a scripted job does when run.
#[derive(Debug, Clone)]
pub enum Script {
    Complete,
    Fail(&'static str),
    /// Sleep, then complete.
    Sleep(u64),
    /// Suspend on a decision between the options; complete with the choice.
    Decide(Vec<&'static str>),
    /// Suspend for human verification; an issue fails the job.
    Verify,
    /// Suspend for a human action; complete once acknowledged.
    Act,
    /// Suspend for verification on every invocation.
    VerifyForever,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Deterministic runner driven by per-job scripts. Unscripted jobs complete.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    inner: Arc<Inner>,
}

impl ScriptedRunner {
    pub fn new<I, S>(scripts: I) -> Self
    where
        I: IntoIterator<Item = (S, Script)>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(Inner {
                scripts: scripts
                    .into_iter()
                    .map(|(id, script)| (id.into(), script))
                    .collect(),
                ..Inner::default()
            }),
        }
    }

    /// Job IDs in invocation order (resumes included).
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, job_id: &str) -> usize {
        self.calls().iter().filter(|id| *id == job_id).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn script(&self, job_id: &str) -> Script {
        self.inner
            .scripts
            .get(job_id)
            .cloned()
            .unwrap_or(Script::Complete)
    }
}

impl JobRunner for ScriptedRunner {
    async fn run(&self, job: &Job, resume: Option<ResumeInput>) -> JobOutcome {
        self.inner.calls.lock().unwrap().push(job.id.clone());
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = match (self.script(&job.id), resume) {
            (Script::Complete, _) => JobOutcome::completed(json!({ "job": job.id })),
            (Script::Fail(reason), _) => JobOutcome::failed(reason),
            (Script::Sleep(ms), _) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                JobOutcome::completed(json!({ "job": job.id }))
            }

            (Script::Decide(options), None) => JobOutcome::suspended(
                Checkpoint::decision(json!({ "question": "which one?" }), options)
                    .with_resume_state(json!({ "job": job.id })),
            ),
            (Script::Decide(_), Some(input)) => match input.response {
                HumanResponse::Selected { option } => {
                    JobOutcome::completed(json!({ "choice": option }))
                }
                other => JobOutcome::failed(format!("unexpected {}", other.label())),
            },

            (Script::Verify, None) | (Script::VerifyForever, _) => {
                JobOutcome::suspended(Checkpoint::human_verify(json!("does it look right?")))
            }
            (Script::Verify, Some(input)) => match input.response {
                HumanResponse::Approved => JobOutcome::completed(json!({ "verified": true })),
                HumanResponse::Issue { description } => JobOutcome::failed(description),
                other => JobOutcome::failed(format!("unexpected {}", other.label())),
            },

            (Script::Act, None) => {
                JobOutcome::suspended(Checkpoint::human_action(json!("rotate the api key")))
            }
            (Script::Act, Some(_)) => JobOutcome::completed(json!({ "acted": true })),
        };

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

pub type TestOrchestrator = Orchestrator<ScriptedRunner, InMemoryJobRepository>;

/// An orchestrator over `runner` and `repo` with default configuration.
pub fn orchestrator(runner: ScriptedRunner, repo: InMemoryJobRepository) -> TestOrchestrator {
    orchestrator_with(runner, repo, SchedulerConfig::default())
}

pub fn orchestrator_with(
    runner: ScriptedRunner,
    repo: InMemoryJobRepository,
    config: SchedulerConfig,
) -> TestOrchestrator {
    init_tracing();
    Orchestrator::new(runner, repo, config)
}

pub fn job(id: &str, deps: &[&str]) -> Job {
    Job::new(id).depends_on(deps.iter().copied())
}

pub fn ids(list: &[String]) -> Vec<&str> {
    list.iter().map(String::as_str).collect()
}
