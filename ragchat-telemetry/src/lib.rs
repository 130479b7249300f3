//! # ragchat-telemetry
//!
//! Logging plumbing shared by the ragchat crates.
//!
//! - [`init_telemetry`] / [`init_json_telemetry`] install a global
//!   `tracing` subscriber filtered by `RUST_LOG`.
//! - [`LogContext`] is the explicit logging handle each component receives
//!   at construction. Components log inside their own child span, and the
//!   root span lives as long as the orchestrator that created it.

mod context;
mod init;

pub use context::LogContext;
pub use init::{init_json_telemetry, init_telemetry};
