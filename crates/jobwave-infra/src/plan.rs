//! TOML plan files.
//!
//! A plan is a list of `[[job]]` tables. Each job may carry a shell `command`
//! and, for jobs that need a human, a `[job.checkpoint]` table. Both are kept
//! in the job's metadata so that the scheduler stays unaware of them and the
//! shell runner can read them back.
//!
//! ```toml
//! satisfied = ["bootstrap"]
//!
//! [[job]]
//! id = "build"
//! command = "cargo build"
//! depends_on = ["bootstrap"]
//!
//! [[job]]
//! id = "pick-db"
//! depends_on = ["build"]
//! command = "./configure --db \"$(echo $JOBWAVE_RESPONSE | jq -r .option)\""
//!
//! [job.checkpoint]
//! kind = "decision"
//! prompt = "Which database?"
//! options = ["postgres", "sqlite"]
//! default_option = "sqlite"
//! ```

use std::path::{Path, PathBuf};

use jobwave_types::checkpoint::{Checkpoint, CheckpointKind};
use jobwave_types::job::Job;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Metadata key holding the job's shell command.
pub const COMMAND_KEY: &str = "command";
/// Metadata key holding the job's [`PlanCheckpoint`].
pub const CHECKPOINT_KEY: &str = "checkpoint";

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("failed to read plan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid job '{job}': {reason}")]
    InvalidJob { job: String, reason: String },
}

/// A checkpoint declared in a plan file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanCheckpoint {
    pub kind: CheckpointKind,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_option: Option<String>,
}

impl PlanCheckpoint {
    /// Read the checkpoint declared in a job's metadata, if any.
    pub fn from_job(job: &Job) -> Option<Self> {
        job.metadata
            .get(CHECKPOINT_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Build the checkpoint a job raises as declared.
    pub fn to_checkpoint(&self, job_id: &str) -> Checkpoint {
        let details = json!({ "job": job_id, "prompt": self.prompt });
        let checkpoint = match self.kind {
            CheckpointKind::HumanVerify => Checkpoint::human_verify(details),
            CheckpointKind::Decision => Checkpoint::decision(details, self.options.iter().cloned()),
            CheckpointKind::HumanAction => Checkpoint::human_action(details),
        };
        match &self.default_option {
            Some(option) => checkpoint.with_default_option(option.clone()),
            None => checkpoint,
        }
    }
}

/// A parsed plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub jobs: Vec<Job>,
    /// Dependency IDs completed outside this plan.
    pub satisfied_externally: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    #[serde(default)]
    satisfied: Vec<String>,
    #[serde(default, rename = "job")]
    jobs: Vec<PlanJob>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanJob {
    id: String,
    #[serde(default)]
    depends_on: Vec<String>,
    wave: Option<u32>,
    autonomous: Option<bool>,
    timeout_secs: Option<u64>,
    command: Option<String>,
    checkpoint: Option<PlanCheckpoint>,
}

impl PlanJob {
    fn into_job(self) -> Result<Job, PlanError> {
        let invalid = |reason: &str| PlanError::InvalidJob {
            job: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        // A declared checkpoint makes the job interactive unless stated otherwise.
        let autonomous = self.autonomous.unwrap_or(self.checkpoint.is_none());
        if autonomous && self.checkpoint.is_some() {
            return Err(invalid("autonomous jobs cannot declare a checkpoint"));
        }
        if let Some(declared) = &self.checkpoint {
            if let Some(default) = &declared.default_option {
                if declared.kind != CheckpointKind::Decision {
                    return Err(invalid("default_option only applies to decision checkpoints"));
                }
                if !declared.options.is_empty() && !declared.options.contains(default) {
                    return Err(invalid("default_option is not one of the options"));
                }
            }
        }

        let mut job = Job::new(self.id).depends_on(self.depends_on);
        job.autonomous = autonomous;
        job.wave = self.wave;
        job.timeout_secs = self.timeout_secs;
        if let Some(command) = self.command {
            job.metadata.insert(COMMAND_KEY.to_string(), json!(command));
        }
        if let Some(declared) = self.checkpoint {
            let value = serde_json::to_value(&declared).map_err(|e| PlanError::InvalidJob {
                job: job.id.clone(),
                reason: e.to_string(),
            })?;
            job.metadata.insert(CHECKPOINT_KEY.to_string(), value);
        }
        Ok(job)
    }
}

/// Parse plan text.
pub fn parse_plan(text: &str) -> Result<Plan, PlanError> {
    let file: PlanFile = toml::from_str(text)?;
    let jobs = file
        .jobs
        .into_iter()
        .map(PlanJob::into_job)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Plan {
        jobs,
        satisfied_externally: file.satisfied,
    })
}

/// Read and parse the plan file at `path`.
pub async fn load_plan(path: &Path) -> Result<Plan, PlanError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let plan = parse_plan(&text)?;
    tracing::debug!(path = %path.display(), jobs = plan.jobs.len(), "plan loaded");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
satisfied = ["bootstrap"]

[[job]]
id = "build"
command = "make"
depends_on = ["bootstrap"]
timeout_secs = 60

[[job]]
id = "pick"
depends_on = ["build"]
wave = 3

[job.checkpoint]
kind = "decision"
prompt = "Which one?"
options = ["a", "b"]
default_option = "b"
"#;

    #[test]
    fn parses_jobs_and_metadata() {
        let plan = parse_plan(PLAN).unwrap();
        assert_eq!(plan.satisfied_externally, vec!["bootstrap"]);
        assert_eq!(plan.jobs.len(), 2);

        let build = &plan.jobs[0];
        assert!(build.autonomous);
        assert_eq!(build.timeout_secs, Some(60));
        assert_eq!(build.metadata[COMMAND_KEY], json!("make"));
        assert!(PlanCheckpoint::from_job(build).is_none());

        let pick = &plan.jobs[1];
        assert!(!pick.autonomous);
        assert_eq!(pick.wave, Some(3));
        let declared = PlanCheckpoint::from_job(pick).unwrap();
        assert_eq!(declared.kind, CheckpointKind::Decision);

        let checkpoint = declared.to_checkpoint("pick");
        assert_eq!(checkpoint.options, vec!["a", "b"]);
        assert_eq!(checkpoint.default_option.as_deref(), Some("b"));
        assert_eq!(checkpoint.prompt_details["prompt"], "Which one?");
    }

    #[test]
    fn rejects_checkpoint_on_autonomous_job() {
        let text = r#"
[[job]]
id = "x"
autonomous = true
[job.checkpoint]
kind = "human-verify"
"#;
        assert!(matches!(
            parse_plan(text),
            Err(PlanError::InvalidJob { job, .. }) if job == "x"
        ));
    }

    #[test]
    fn rejects_unknown_default_option() {
        let text = r#"
[[job]]
id = "x"
[job.checkpoint]
kind = "decision"
options = ["a"]
default_option = "z"
"#;
        assert!(matches!(parse_plan(text), Err(PlanError::InvalidJob { .. })));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            parse_plan("[[job]]\nid = \"x\"\ncomand = \"typo\"\n"),
            Err(PlanError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn load_plan_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_plan(&dir.path().join("nope.toml")).await.unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }
}
