//! Job domain types.
//!
//! A `Job` is the unit of schedulable work. Its dependency list forms the
//! edges of the execution DAG; its status is owned by the job store and only
//! changes through compare-and-set transitions. `JobOutcome` is the tagged
//! result a job runner hands back -- completion, failure, or suspension at a
//! checkpoint.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of work with declared dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, stable across runs.
    pub id: String,
    /// Job IDs that must be complete before this job may start.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Explicit wave override. May only place a job later than its computed wave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave: Option<u32>,
    /// `false` means the job is expected to pause at a human checkpoint.
    #[serde(default = "default_autonomous")]
    pub autonomous: bool,
    /// Per-job timeout in seconds (falls back to the configured default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Opaque payload for the job runner.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: JobStatus,
    /// Result payload; present only when `status` is `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Why the job failed; present only when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// The failed ancestor responsible; present only when `status` is `Blocked`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    /// Number of runner invocations so far (fresh run plus resumes).
    #[serde(default)]
    pub attempts: u32,
}

fn default_autonomous() -> bool {
    true
}

impl Job {
    /// Create a pending, autonomous job with no dependencies.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            wave: None,
            autonomous: true,
            timeout_secs: None,
            metadata: HashMap::new(),
            status: JobStatus::Pending,
            result: None,
            failure_reason: None,
            blocked_by: None,
            attempts: 0,
        }
    }

    /// Set the dependency list.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Pin the job to an explicit wave.
    pub fn with_wave(mut self, wave: u32) -> Self {
        self.wave = Some(wave);
        self
    }

    /// Mark the job as expecting a human checkpoint.
    pub fn interactive(mut self) -> Self {
        self.autonomous = false;
        self
    }

    /// Set a per-job timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Reset all execution state, keeping the definition.
    pub fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.result = None;
        self.failure_reason = None;
        self.blocked_by = None;
        self.attempts = 0;
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
///
/// `Pending -> Running -> {Completed | Failed | Suspended}`, with
/// `Suspended -> Running` on resume. `Blocked` is applied to jobs whose
/// (transitive) dependency failed; a blocked job never runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
    Blocked,
}

impl JobStatus {
    /// Whether the job can no longer change without caller intervention.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }

    /// Whether a wave may return with the job in this status.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Suspended)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure reason
// ---------------------------------------------------------------------------

/// Why a job failed.
///
/// Timeouts aggregate like every other failure but keep their own variant so
/// callers can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The runner reported a failure.
    Runner { message: String },
    /// The job exceeded its timeout.
    Timeout { secs: u64 },
    /// The runner task panicked.
    Panicked { message: String },
}

impl FailureReason {
    pub fn runner(message: impl Into<String>) -> Self {
        Self::Runner {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runner { message } => write!(f, "{message}"),
            Self::Timeout { secs } => write!(f, "timeout after {secs}s"),
            Self::Panicked { message } => write!(f, "runner panicked: {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What a single runner invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { result: serde_json::Value },
    Failed { reason: FailureReason },
    Suspended { checkpoint: Checkpoint },
}

impl JobOutcome {
    pub fn completed(result: serde_json::Value) -> Self {
        Self::Completed { result }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            reason: FailureReason::runner(message),
        }
    }

    pub fn suspended(checkpoint: Checkpoint) -> Self {
        Self::Suspended { checkpoint }
    }

    /// The job status this outcome maps to.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
            Self::Suspended { .. } => JobStatus::Suspended,
        }
    }
}

/// Outcome of one job within a wave, tagged with its ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub outcome: JobOutcome,
    /// Attempt number of the invocation that produced this outcome (1-based).
    pub attempt: u32,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Wave
// ---------------------------------------------------------------------------

/// A batch of jobs with no dependency edges between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    /// 0-based wave index.
    pub index: u32,
    /// Job IDs in input order.
    pub job_ids: Vec<String>,
}

impl Wave {
    pub fn len(&self) -> usize {
        self.job_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.job_ids.is_empty()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.job_ids.iter().any(|id| id == job_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
