//! Lifecycle events emitted by the scheduler.
//!
//! `SchedulerEvent` is broadcast on the core event bus so the calling
//! environment can render progress. All variants are Clone + Send + Sync.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::CheckpointKind;
use crate::report::{Decision, OrchestratorState};

/// Events emitted while an execution unit runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// The orchestrator moved to a new state.
    StateChanged {
        execution_id: Uuid,
        from: OrchestratorState,
        to: OrchestratorState,
    },

    /// A wave is about to start.
    WaveStarted {
        execution_id: Uuid,
        wave: u32,
        /// Number of jobs the wave will attempt.
        jobs: usize,
    },

    /// Every job of a wave reached a settled state.
    WaveFinished {
        execution_id: Uuid,
        wave: u32,
        completed: usize,
        failed: usize,
        suspended: usize,
        decision: Decision,
    },

    JobStarted {
        execution_id: Uuid,
        job_id: String,
        attempt: u32,
    },

    JobCompleted {
        execution_id: Uuid,
        job_id: String,
        duration_ms: u64,
    },

    JobFailed {
        execution_id: Uuid,
        job_id: String,
        reason: String,
    },

    JobSuspended {
        execution_id: Uuid,
        job_id: String,
        kind: CheckpointKind,
    },

    /// A suspended job was re-invoked with a human (or auto) response.
    JobResumed {
        execution_id: Uuid,
        job_id: String,
        auto_resolved: bool,
    },

    /// A job will never run because an ancestor failed.
    JobBlocked {
        execution_id: Uuid,
        job_id: String,
        blocked_by: String,
    },

    /// A checkpoint response was rejected; the job stays suspended.
    ResponseRejected {
        execution_id: Uuid,
        job_id: String,
        error: String,
    },
}

impl SchedulerEvent {
    /// The execution unit this event belongs to.
    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::StateChanged { execution_id, .. }
            | Self::WaveStarted { execution_id, .. }
            | Self::WaveFinished { execution_id, .. }
            | Self::JobStarted { execution_id, .. }
            | Self::JobCompleted { execution_id, .. }
            | Self::JobFailed { execution_id, .. }
            | Self::JobSuspended { execution_id, .. }
            | Self::JobResumed { execution_id, .. }
            | Self::JobBlocked { execution_id, .. }
            | Self::ResponseRejected { execution_id, .. } => *execution_id,
        }
    }

    /// The job this event refers to, for job-level events.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobSuspended { job_id, .. }
            | Self::JobResumed { job_id, .. }
            | Self::JobBlocked { job_id, .. }
            | Self::ResponseRejected { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = SchedulerEvent::JobSuspended {
            execution_id: Uuid::nil(),
            job_id: "deploy".to_string(),
            kind: CheckpointKind::HumanAction,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "job_suspended");
        assert_eq!(v["kind"], "human-action");
    }

    #[test]
    fn accessors() {
        let id = Uuid::now_v7();
        let event = SchedulerEvent::WaveStarted {
            execution_id: id,
            wave: 1,
            jobs: 3,
        };
        assert_eq!(event.execution_id(), id);
        assert_eq!(event.job_id(), None);

        let event = SchedulerEvent::JobBlocked {
            execution_id: id,
            job_id: "c".to_string(),
            blocked_by: "a".to_string(),
        };
        assert_eq!(event.job_id(), Some("c"));
    }
}
