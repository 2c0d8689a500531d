//! Run reports, aggregation decisions, and orchestrator states.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::CheckpointKind;
use crate::job::FailureReason;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// What the aggregator recommends after a wave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Proceed to the next wave.
    #[default]
    Continue,
    /// At least one job failed; a human should look before continuing.
    HaltForReview,
    /// Every job in the wave failed -- likely an environment problem.
    StopSystemic,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::HaltForReview => "halt_for_review",
            Self::StopSystemic => "stop_systemic",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator state
// ---------------------------------------------------------------------------

/// Why a run halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    FailureReview,
    Systemic,
    StopRequested,
    /// Fail-fast skipped the rest of a wave; resuming runs the skipped jobs.
    FailFast,
}

/// States of the orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "wave", rename_all = "snake_case")]
pub enum OrchestratorState {
    Initializing,
    RunningWave(u32),
    AwaitingCheckpoint(u32),
    Aggregating(u32),
    Completed,
    Halted(HaltReason),
}

impl OrchestratorState {
    /// Whether the state ends the run until the caller intervenes.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Halted(_))
    }

    /// The wave the state refers to, if any.
    pub fn wave(self) -> Option<u32> {
        match self {
            Self::RunningWave(n) | Self::AwaitingCheckpoint(n) | Self::Aggregating(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => f.write_str("initializing"),
            Self::RunningWave(n) => write!(f, "running wave {n}"),
            Self::AwaitingCheckpoint(n) => write!(f, "awaiting checkpoint (wave {n})"),
            Self::Aggregating(n) => write!(f, "aggregating wave {n}"),
            Self::Completed => f.write_str("completed"),
            Self::Halted(HaltReason::FailureReview) => f.write_str("halted for review"),
            Self::Halted(HaltReason::Systemic) => f.write_str("halted (systemic failure)"),
            Self::Halted(HaltReason::StopRequested) => f.write_str("halted (stop requested)"),
            Self::Halted(HaltReason::FailFast) => f.write_str("halted (fail-fast)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    pub job_id: String,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedJob {
    pub job_id: String,
    /// The failed ancestor responsible.
    pub blocked_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendedEntry {
    pub job_id: String,
    pub kind: CheckpointKind,
}

/// A checkpoint response that did not match the checkpoint's expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedResponse {
    pub job_id: String,
    pub error: String,
}

/// Aggregate outcome of one execution pass.
///
/// Lists are sorted by job ID so two runs over the same jobs compare equal
/// regardless of completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub execution_id: Uuid,
    pub state: OrchestratorState,
    pub decision: Decision,
    pub waves_total: u32,
    /// Wave the run stopped in (or the last wave, when completed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_wave: Option<u32>,
    pub completed: Vec<String>,
    pub failed: Vec<FailedJob>,
    pub suspended: Vec<SuspendedEntry>,
    pub blocked: Vec<BlockedJob>,
    pub pending: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_responses: Vec<RejectedResponse>,
}

impl RunReport {
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn suspended_count(&self) -> usize {
        self.suspended.len()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    /// Whether execution may proceed to the next wave.
    pub fn may_continue(&self) -> bool {
        self.decision == Decision::Continue && !self.state.is_final()
    }

    /// Whether the caller must answer checkpoints before anything else runs.
    pub fn needs_response(&self) -> bool {
        matches!(self.state, OrchestratorState::AwaitingCheckpoint(_))
    }

    pub fn blocked_by(&self, job_id: &str) -> Option<&str> {
        self.blocked
            .iter()
            .find(|b| b.job_id == job_id)
            .map(|b| b.blocked_by.as_str())
    }

    pub fn failure_of(&self, job_id: &str) -> Option<&FailureReason> {
        self.failed
            .iter()
            .find(|f| f.job_id == job_id)
            .map(|f| &f.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: OrchestratorState, decision: Decision) -> RunReport {
        RunReport {
            execution_id: Uuid::nil(),
            state,
            decision,
            waves_total: 2,
            current_wave: Some(0),
            completed: vec!["a".to_string()],
            failed: vec![FailedJob {
                job_id: "b".to_string(),
                reason: FailureReason::Timeout { secs: 3 },
            }],
            suspended: Vec::new(),
            blocked: vec![BlockedJob {
                job_id: "c".to_string(),
                blocked_by: "b".to_string(),
            }],
            pending: Vec::new(),
            rejected_responses: Vec::new(),
        }
    }

    #[test]
    fn lookups_find_entries() {
        let r = report(
            OrchestratorState::Halted(HaltReason::FailureReview),
            Decision::HaltForReview,
        );
        assert_eq!(r.blocked_by("c"), Some("b"));
        assert!(r.failure_of("b").unwrap().is_timeout());
        assert_eq!(r.completed_count(), 1);
        assert_eq!(r.blocked_count(), 1);
        assert!(!r.may_continue());
    }

    #[test]
    fn state_serializes_with_wave() {
        let v = serde_json::to_value(OrchestratorState::AwaitingCheckpoint(2)).unwrap();
        assert_eq!(v["state"], "awaiting_checkpoint");
        assert_eq!(v["wave"], 2);
        let halted = serde_json::to_value(OrchestratorState::Halted(HaltReason::Systemic)).unwrap();
        assert_eq!(halted["wave"], "systemic");
        let fail_fast = OrchestratorState::Halted(HaltReason::FailFast);
        assert_eq!(serde_json::to_value(fail_fast).unwrap()["wave"], "fail_fast");
        assert_eq!(fail_fast.to_string(), "halted (fail-fast)");
    }

    #[test]
    fn state_helpers() {
        assert!(OrchestratorState::Completed.is_final());
        assert!(!OrchestratorState::AwaitingCheckpoint(0).is_final());
        assert_eq!(OrchestratorState::Aggregating(4).wave(), Some(4));
        assert_eq!(OrchestratorState::Completed.wave(), None);
    }

    #[test]
    fn needs_response_only_when_awaiting() {
        let awaiting = report(OrchestratorState::AwaitingCheckpoint(0), Decision::Continue);
        assert!(awaiting.needs_response());
        assert!(!report(OrchestratorState::Completed, Decision::Continue).needs_response());
    }
}
