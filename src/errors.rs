//! Typed error hierarchy for agent-eta.
//!
//! Three enums cover the fallible surfaces of the library:
//! - `TrackerError`: tracker lifecycle misuse and reporter thread failures
//! - `MonitorError`: resource monitor thread failures
//! - `ProtocolError`: malformed machine-readable status lines
//!
//! Errors raised by tracked work are never wrapped; they reach the caller
//! of `run_with_tracking` unchanged.

use thiserror::Error;

/// Errors from the tracker lifecycle.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Tracker already started; trackers are single-use")]
    AlreadyStarted,

    #[error("Failed to spawn reporter thread: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// Errors from the resource monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to spawn monitor thread: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// Errors from decoding a machine-readable status line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Line does not start with the STATUS| prefix: {line}")]
    MissingPrefix { line: String },

    #[error("Invalid status payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}
