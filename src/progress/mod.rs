//! Step-based progress tracking and ETA estimation.
//!
//! - `state`: raw progress record and the derived [`StatusSnapshot`]
//! - `eta`: pure estimation and formatting functions
//! - `tracker`: state owner with a background reporter thread
//! - `wrapper`: runs work under a fresh tracker with guaranteed cleanup

pub mod eta;
pub mod state;
pub mod tracker;
pub mod wrapper;

pub use eta::{format_duration, render_progress_bar};
pub use state::{ProgressState, StatusSnapshot, TrackingOptions};
pub use tracker::{Tracker, TrackerSettings};
pub use wrapper::{ExecutionWrapper, track};
