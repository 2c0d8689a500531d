//! Observability setup for jobwave: structured logging with optional
//! OpenTelemetry span export.

pub mod tracing_setup;
