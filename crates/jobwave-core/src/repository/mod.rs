//! Repository trait definitions (ports) for persisting scheduler state.
//!
//! These traits live in jobwave-core so that business logic depends only on
//! abstractions. The infrastructure layer (jobwave-infra) provides the SQLite
//! implementation; `memory` holds an in-process one.

pub mod job;
pub mod memory;

pub use job::JobRepository;
pub use memory::InMemoryJobRepository;
