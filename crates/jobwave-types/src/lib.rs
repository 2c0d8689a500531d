//! Shared domain types for jobwave.
//!
//! This crate contains the types exchanged between the scheduler core, its
//! persistence adapters, and the CLI: jobs, checkpoints, outcomes, run
//! reports, lifecycle events, configuration, and the error types shared by
//! repository implementations.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod job;
pub mod report;
