//! Shell-command job runner.
//!
//! Runs the `command` stored in a job's metadata with `sh -c`. Jobs that are
//! not autonomous raise their checkpoint before the command runs; the
//! command then runs on resume with the human's answer in
//! `JOBWAVE_RESPONSE` as JSON.

use std::path::PathBuf;
use std::process::Stdio;

use jobwave_core::runner::JobRunner;
use jobwave_types::checkpoint::{CheckpointKind, HumanResponse, ResumeInput};
use jobwave_types::job::{Job, JobOutcome};
use serde_json::json;
use tokio::process::Command;

use crate::plan::{COMMAND_KEY, PlanCheckpoint};

/// Environment variable carrying the human response on resume.
pub const RESPONSE_ENV: &str = "JOBWAVE_RESPONSE";
/// Environment variable carrying the job ID.
pub const JOB_ID_ENV: &str = "JOBWAVE_JOB_ID";

const DEFAULT_TAIL_BYTES: usize = 4096;

/// Runs job commands through a shell.
#[derive(Debug, Clone)]
pub struct ShellJobRunner {
    shell: String,
    working_dir: Option<PathBuf>,
    tail_bytes: usize,
}

impl Default for ShellJobRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            working_dir: None,
            tail_bytes: DEFAULT_TAIL_BYTES,
        }
    }
}

impl ShellJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    async fn run_command(
        &self,
        job: &Job,
        command: &str,
        response: Option<&HumanResponse>,
    ) -> JobOutcome {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .env(JOB_ID_ENV, &job.id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The executor's timeout drops this future; the child must not outlive it.
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(response) = response {
            match serde_json::to_string(response) {
                Ok(encoded) => {
                    cmd.env(RESPONSE_ENV, encoded);
                }
                Err(e) => return JobOutcome::failed(format!("failed to encode response: {e}")),
            }
        }

        tracing::debug!(job_id = job.id.as_str(), command, "spawning job command");
        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => return JobOutcome::failed(format!("failed to spawn '{}': {e}", self.shell)),
        };

        let stdout = tail(&output.stdout, self.tail_bytes);
        let stderr = tail(&output.stderr, self.tail_bytes);
        if output.status.success() {
            JobOutcome::completed(json!({
                "exit_code": 0,
                "stdout": stdout,
                "stderr": stderr,
            }))
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let detail = stderr.trim();
            if detail.is_empty() {
                JobOutcome::failed(format!("command exited with {code}"))
            } else {
                JobOutcome::failed(format!("command exited with {code}: {detail}"))
            }
        }
    }
}

/// Last `max` bytes of `bytes` as lossy UTF-8.
fn tail(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

impl JobRunner for ShellJobRunner {
    async fn run(&self, job: &Job, resume: Option<ResumeInput>) -> JobOutcome {
        let declared = PlanCheckpoint::from_job(job);

        let response = match resume {
            None if !job.autonomous => {
                let checkpoint = match &declared {
                    Some(declared) => declared.to_checkpoint(&job.id),
                    None => PlanCheckpoint {
                        kind: CheckpointKind::HumanVerify,
                        prompt: format!("confirm job '{}'", job.id),
                        options: Vec::new(),
                        default_option: None,
                    }
                    .to_checkpoint(&job.id),
                };
                let checkpoint = checkpoint.with_resume_state(json!({ "job": job.id }));
                return JobOutcome::suspended(checkpoint);
            }
            None => None,
            Some(ResumeInput { response, .. }) => Some(response),
        };

        if let Some(HumanResponse::Issue { description }) = &response {
            return JobOutcome::failed(format!("verification issue: {description}"));
        }

        match job.metadata.get(COMMAND_KEY).and_then(|v| v.as_str()) {
            Some(command) => self.run_command(job, command, response.as_ref()).await,
            None => JobOutcome::completed(json!({ "response": response })),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use jobwave_types::checkpoint::ResumeState;
    use jobwave_types::job::{FailureReason, JobStatus};

    fn shell_job(id: &str, command: &str) -> Job {
        Job::new(id).with_metadata(COMMAND_KEY, json!(command))
    }

    #[tokio::test]
    async fn successful_command_completes_with_output() {
        let runner = ShellJobRunner::new();
        let outcome = runner.run(&shell_job("a", "echo \"hi $JOBWAVE_JOB_ID\""), None).await;
        match outcome {
            JobOutcome::Completed { result } => {
                assert_eq!(result["exit_code"], 0);
                assert_eq!(result["stdout"], "hi a\n");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code_and_stderr() {
        let runner = ShellJobRunner::new();
        let outcome = runner.run(&shell_job("a", "echo broken >&2; exit 3"), None).await;
        match outcome {
            JobOutcome::Failed {
                reason: FailureReason::Runner { message },
            } => assert_eq!(message, "command exited with 3: broken"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn interactive_job_suspends_then_runs_with_response() {
        let runner = ShellJobRunner::new();
        let job = shell_job("pick", "echo \"$JOBWAVE_RESPONSE\"").interactive();

        let first = runner.run(&job, None).await;
        let checkpoint = match first {
            JobOutcome::Suspended { checkpoint } => checkpoint,
            other => panic!("expected suspension, got {other:?}"),
        };
        assert_eq!(checkpoint.kind, CheckpointKind::HumanVerify);

        let resumed = runner
            .run(
                &job,
                Some(ResumeInput {
                    state: checkpoint.resume_state,
                    response: HumanResponse::Approved,
                }),
            )
            .await;
        match resumed {
            JobOutcome::Completed { result } => {
                assert_eq!(result["stdout"], "{\"type\":\"approved\"}\n");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn issue_response_fails_without_running_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellJobRunner::new().with_working_dir(dir.path());
        let job = shell_job("ui", "touch ran").interactive();

        let outcome = runner
            .run(
                &job,
                Some(ResumeInput {
                    state: ResumeState::default(),
                    response: HumanResponse::Issue {
                        description: "button missing".to_string(),
                    },
                }),
            )
            .await;

        assert_eq!(outcome.status(), JobStatus::Failed);
        assert!(!dir.path().join("ran").exists());
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail(b"abcdef", 3), "def");
        assert_eq!(tail(b"ab", 3), "ab");
    }
}
