//! Execution-unit records.
//!
//! An execution unit is one `execute` call over a job set. Its record is what
//! a fresh process loads to pick up where a previous one stopped.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ExecuteOptions;
use crate::report::{OrchestratorState, RunReport};

/// Persisted state of one execution unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    pub options: ExecuteOptions,
    pub state: OrchestratorState,
    /// Failed job IDs the caller chose not to block dependents on.
    #[serde(default)]
    pub overrides: BTreeSet<String>,
    /// Report produced by the most recent pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_report: Option<RunReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(options: ExecuteOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            options,
            state: OrchestratorState::Initializing,
            overrides: BTreeSet::new(),
            last_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `state`, bumping `updated_at`.
    pub fn set_state(&mut self, state: OrchestratorState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn is_overridden(&self, job_id: &str) -> bool {
        self.overrides.contains(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_initializing() {
        let record = ExecutionRecord::new(ExecuteOptions::default());
        assert_eq!(record.state, OrchestratorState::Initializing);
        assert!(record.overrides.is_empty());
        assert!(record.last_report.is_none());
    }

    #[test]
    fn set_state_bumps_timestamp() {
        let mut record = ExecutionRecord::new(ExecuteOptions::default());
        let before = record.updated_at;
        record.set_state(OrchestratorState::RunningWave(0));
        assert_eq!(record.state, OrchestratorState::RunningWave(0));
        assert!(record.updated_at >= before);
    }

    #[test]
    fn record_round_trips_json() {
        let mut record = ExecutionRecord::new(ExecuteOptions::sequential());
        record.overrides.insert("a".to_string());
        let json = serde_json::to_string(&record).unwrap();
        let back: ExecutionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(back.is_overridden("a"));
    }
}
