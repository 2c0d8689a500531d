//! Infrastructure layer for jobwave.
//!
//! Contains implementations of the ports defined in `jobwave-core`: SQLite
//! storage for execution units, the TOML config loader, plan-file parsing,
//! and a shell-command job runner.

pub mod config;
pub mod plan;
pub mod runner;
pub mod sqlite;
