//! Progress and ETA reporting for long-running, step-based work such as AI
//! agent calls.
//!
//! Work runs under an [`ExecutionWrapper`], which owns a [`Tracker`] for the
//! duration of the call. The tracker's reporter thread writes a rewritable
//! `ETA: ...` line to stderr and `STATUS|<json>` records to stdout, and the
//! wrapper always finishes with `STATUS|COMPLETE`.
//!
//! ```no_run
//! use agent_eta::{ExecutionWrapper, TrackingOptions};
//!
//! let wrapper = ExecutionWrapper::new();
//! let answer: Result<u32, std::io::Error> =
//!     wrapper.run_with_tracking(TrackingOptions::new(3, 5.0), |w| {
//!         w.advance_step(Some(1), Some("Reading"));
//!         w.advance_step(Some(2), Some("Thinking"));
//!         w.update_tokens(250);
//!         w.advance_step(Some(3), Some("Answering"));
//!         Ok(42)
//!     });
//! ```

pub mod config;
pub mod errors;
pub mod monitor;
pub mod progress;
pub mod report;

pub use errors::{MonitorError, ProtocolError, TrackerError};
pub use monitor::{ResourceMonitor, ResourceSampler, SystemSampler};
pub use progress::{ExecutionWrapper, StatusSnapshot, Tracker, TrackingOptions, track};
pub use report::{ReportingChannel, StatusLine};
