//! Scheduler configuration.
//!
//! `SchedulerConfig` is loaded from `config.toml` in the data directory; every
//! field has a default so an empty or missing file is valid. `ExecuteOptions`
//! carries the per-call overrides of `execute`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// What to do after a wave in which some (but not all) jobs failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop and wait for a human to review (and possibly override) failures.
    #[default]
    Halt,
    /// Keep going; dependents of failed jobs are blocked and skipped.
    ContinueWithBlocked,
}

/// Top-level scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the jobs of a wave concurrently (false = one at a time).
    #[serde(default = "default_concurrent")]
    pub concurrent: bool,

    /// Upper bound on concurrently running jobs within a wave (None = unbounded).
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// In sequential mode, stop the rest of the wave after the first failure.
    #[serde(default)]
    pub fail_fast: bool,

    /// Answer auto-resolvable checkpoints without a human.
    #[serde(default)]
    pub auto_resolve: bool,

    /// Option picked for auto-resolved decisions that carry no default of their own.
    #[serde(default)]
    pub default_decision_option: Option<String>,

    /// Timeout applied to jobs without their own `timeout_secs`.
    #[serde(default = "default_job_timeout_secs")]
    pub default_job_timeout_secs: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// How many times one job may be auto-resolved in a single pass.
    #[serde(default = "default_max_auto_resolutions")]
    pub max_auto_resolutions: u32,

    /// Capacity of the lifecycle event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_concurrent() -> bool {
    true
}

fn default_job_timeout_secs() -> u64 {
    1800
}

fn default_max_auto_resolutions() -> u32 {
    8
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrent: default_concurrent(),
            max_concurrency: None,
            fail_fast: false,
            auto_resolve: false,
            default_decision_option: None,
            default_job_timeout_secs: default_job_timeout_secs(),
            failure_policy: FailurePolicy::default(),
            max_auto_resolutions: default_max_auto_resolutions(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SchedulerConfig {
    /// Apply per-call options on top of this configuration.
    pub fn with_options(&self, options: &ExecuteOptions) -> Self {
        let mut config = self.clone();
        if let Some(concurrent) = options.concurrent {
            config.concurrent = concurrent;
        }
        if let Some(auto_resolve) = options.auto_resolve {
            config.auto_resolve = auto_resolve;
        }
        if let Some(max) = options.max_concurrency {
            config.max_concurrency = Some(max);
        }
        config
    }
}

/// Options for a single `execute` call. Unset fields keep the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_resolve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// IDs completed outside this job set; dependencies on them are satisfied.
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub satisfied_externally: HashSet<String>,
}

impl ExecuteOptions {
    pub fn sequential() -> Self {
        Self {
            concurrent: Some(false),
            ..Self::default()
        }
    }

    pub fn with_auto_resolve(mut self, auto_resolve: bool) -> Self {
        self.auto_resolve = Some(auto_resolve);
        self
    }

    pub fn with_satisfied<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.satisfied_externally
            .extend(ids.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = SchedulerConfig::default();
        assert!(config.concurrent);
        assert_eq!(config.max_concurrency, None);
        assert!(!config.auto_resolve);
        assert_eq!(config.default_job_timeout_secs, 1800);
        assert_eq!(config.failure_policy, FailurePolicy::Halt);
        assert_eq!(config.max_auto_resolutions, 8);
    }

    #[test]
    fn deserialize_empty_toml_uses_defaults() {
        let config: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn deserialize_with_values() {
        let config: SchedulerConfig = toml::from_str(
            r#"
concurrent = false
max_concurrency = 4
fail_fast = true
default_decision_option = "skip"
failure_policy = "continue_with_blocked"
"#,
        )
        .unwrap();
        assert!(!config.concurrent);
        assert_eq!(config.max_concurrency, Some(4));
        assert!(config.fail_fast);
        assert_eq!(config.default_decision_option.as_deref(), Some("skip"));
        assert_eq!(config.failure_policy, FailurePolicy::ContinueWithBlocked);
    }

    #[test]
    fn options_override_config() {
        let config = SchedulerConfig {
            max_concurrency: Some(2),
            ..SchedulerConfig::default()
        };
        let merged = config.with_options(&ExecuteOptions::sequential().with_auto_resolve(true));
        assert!(!merged.concurrent);
        assert!(merged.auto_resolve);
        assert_eq!(merged.max_concurrency, Some(2));
    }

    #[test]
    fn unset_options_keep_config() {
        let config = SchedulerConfig {
            concurrent: false,
            auto_resolve: true,
            ..SchedulerConfig::default()
        };
        let merged = config.with_options(&ExecuteOptions::default());
        assert!(!merged.concurrent);
        assert!(merged.auto_resolve);
    }

    #[test]
    fn options_from_older_records_still_parse() {
        let options: ExecuteOptions =
            serde_json::from_str(r#"{"concurrent":true,"auto_resolve":false}"#).unwrap();
        assert_eq!(options.concurrent, Some(true));
        assert_eq!(options.auto_resolve, Some(false));
        assert_eq!(
            serde_json::to_string(&ExecuteOptions::default()).unwrap(),
            "{}"
        );
    }
}
