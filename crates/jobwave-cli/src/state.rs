//! Application state wiring the orchestrator to its concrete collaborators.
//!
//! The orchestrator is generic over its repository. `AppState` pins the
//! runner to the shell runner and lets the caller choose SQLite (default) or
//! an in-memory repository (`--ephemeral`).

use std::path::PathBuf;

use jobwave_core::orchestrator::Orchestrator;
use jobwave_core::repository::{InMemoryJobRepository, JobRepository};
use jobwave_infra::config::{load_config, resolve_data_dir};
use jobwave_infra::runner::ShellJobRunner;
use jobwave_infra::sqlite::job::SqliteJobRepository;
use jobwave_infra::sqlite::pool::DatabasePool;

pub type SqliteState = AppState<SqliteJobRepository>;
pub type EphemeralState = AppState<InMemoryJobRepository>;

/// Everything a command handler needs.
pub struct AppState<Repo> {
    pub orchestrator: Orchestrator<ShellJobRunner, Repo>,
    pub data_dir: PathBuf,
}

impl<Repo: JobRepository + 'static> AppState<Repo> {
    fn with_repo(
        repo: Repo,
        data_dir: PathBuf,
        config: jobwave_types::config::SchedulerConfig,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(ShellJobRunner::new(), repo, config),
            data_dir,
        }
    }
}

impl SqliteState {
    /// Open the database in `data_dir` (or the resolved default) and load config.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_config(&data_dir).await;
        let pool = DatabasePool::open_in(&data_dir).await?;
        tracing::debug!(data_dir = %data_dir.display(), "state initialized");
        Ok(Self::with_repo(SqliteJobRepository::new(pool), data_dir, config))
    }
}

impl EphemeralState {
    /// In-memory state; config is still read from `data_dir` when present.
    pub async fn init(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_config(&data_dir).await;
        Self::with_repo(InMemoryJobRepository::new(), data_dir, config)
    }
}
