//! Checkpoint types: suspension points that need a human before a job continues.
//!
//! A suspended job is represented only by data -- the checkpoint it raised and
//! an explicit `ResumeState` snapshot. Resuming always starts a fresh runner
//! invocation from that snapshot, so a suspension may outlive the process.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of human interaction a checkpoint needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointKind {
    /// A human confirms the work (approve or describe an issue).
    HumanVerify,
    /// A human picks one of the offered options.
    Decision,
    /// A human performs an action in the outside world and acknowledges it.
    HumanAction,
}

impl CheckpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HumanVerify => "human-verify",
            Self::Decision => "decision",
            Self::HumanAction => "human-action",
        }
    }

    /// Whether a non-interactive run may ever answer this checkpoint itself.
    pub fn allows_auto_resolution(self) -> bool {
        !matches!(self, Self::HumanAction)
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human-verify" => Ok(Self::HumanVerify),
            "decision" => Ok(Self::Decision),
            "human-action" => Ok(Self::HumanAction),
            other => Err(format!("invalid checkpoint kind: '{other}'")),
        }
    }
}

/// Serializable snapshot of job progress, produced by the runner.
///
/// Opaque to the scheduler: it is stored and handed back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeState(pub serde_json::Value);

impl ResumeState {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// A suspension point raised by a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub kind: CheckpointKind,
    /// Free-form data shown to the human.
    #[serde(default)]
    pub prompt_details: serde_json::Value,
    /// Choices offered by a `Decision` checkpoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Option picked when a `Decision` is auto-resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_option: Option<String>,
    /// Where to pick up when the job is resumed.
    #[serde(default)]
    pub resume_state: ResumeState,
}

impl Checkpoint {
    pub fn human_verify(prompt_details: serde_json::Value) -> Self {
        Self {
            kind: CheckpointKind::HumanVerify,
            prompt_details,
            options: Vec::new(),
            default_option: None,
            resume_state: ResumeState::default(),
        }
    }

    pub fn decision<I, S>(prompt_details: serde_json::Value, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: CheckpointKind::Decision,
            prompt_details,
            options: options.into_iter().map(Into::into).collect(),
            default_option: None,
            resume_state: ResumeState::default(),
        }
    }

    pub fn human_action(prompt_details: serde_json::Value) -> Self {
        Self {
            kind: CheckpointKind::HumanAction,
            prompt_details,
            options: Vec::new(),
            default_option: None,
            resume_state: ResumeState::default(),
        }
    }

    pub fn with_default_option(mut self, option: impl Into<String>) -> Self {
        self.default_option = Some(option.into());
        self
    }

    pub fn with_resume_state(mut self, state: serde_json::Value) -> Self {
        self.resume_state = ResumeState(state);
        self
    }
}

/// A human's answer to a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HumanResponse {
    /// Verification passed.
    Approved,
    /// Verification found a problem.
    Issue { description: String },
    /// A decision option was selected.
    Selected { option: String },
    /// An external action was performed.
    Acknowledged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl HumanResponse {
    /// Short label used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Issue { .. } => "issue",
            Self::Selected { .. } => "selected",
            Self::Acknowledged { .. } => "acknowledged",
        }
    }
}

/// What the runner receives when a suspended job is re-invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeInput {
    pub state: ResumeState,
    pub response: HumanResponse,
}

/// A persisted suspension, owned by the checkpoint controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedJob {
    pub execution_id: Uuid,
    pub job_id: String,
    pub checkpoint: Checkpoint,
    pub suspended_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_uses_kebab_case() {
        let v = serde_json::to_value(CheckpointKind::HumanVerify).unwrap();
        assert_eq!(v, json!("human-verify"));
        assert_eq!(
            "human-action".parse::<CheckpointKind>().unwrap(),
            CheckpointKind::HumanAction
        );
    }

    #[test]
    fn human_action_never_auto_resolves() {
        assert!(CheckpointKind::HumanVerify.allows_auto_resolution());
        assert!(CheckpointKind::Decision.allows_auto_resolution());
        assert!(!CheckpointKind::HumanAction.allows_auto_resolution());
    }

    #[test]
    fn resume_state_is_transparent() {
        let cp = Checkpoint::decision(json!({"question": "db?"}), ["pg", "sqlite"])
            .with_resume_state(json!({"step": 3}));
        let v = serde_json::to_value(&cp).unwrap();
        assert_eq!(v["resume_state"], json!({"step": 3}));
        assert_eq!(v["options"], json!(["pg", "sqlite"]));
        let back: Checkpoint = serde_json::from_value(v).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn response_is_tagged() {
        let v = serde_json::to_value(HumanResponse::Selected {
            option: "X".to_string(),
        })
        .unwrap();
        assert_eq!(v, json!({"type": "selected", "option": "X"}));
        let ack: HumanResponse = serde_json::from_value(json!({"type": "acknowledged"})).unwrap();
        assert_eq!(ack, HumanResponse::Acknowledged { note: None });
    }
}
