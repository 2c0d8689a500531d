//! Scheduling core for jobwave.
//!
//! This crate holds the wave scheduler and the "ports" it depends on:
//! - `graph` -- DAG construction, cycle detection, wave partitioning
//! - `store` -- the job store, single source of truth for job status
//! - `runner` -- the job runner trait and the claim-verifying decorator
//! - `executor` -- runs one wave concurrently or sequentially
//! - `checkpoint` -- suspends jobs at checkpoints and resumes them from snapshots
//! - `aggregator` -- folds outcomes into decisions and run reports
//! - `orchestrator` -- drives the waves and owns the run state machine
//! - `repository` -- persistence trait plus an in-memory implementation
//! - `event` -- broadcast bus of lifecycle events
//!
//! It depends only on `jobwave-types` -- never on `jobwave-infra` or any
//! database/IO crate.

pub mod aggregator;
pub mod checkpoint;
pub mod event;
pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod repository;
pub mod runner;
pub mod store;
