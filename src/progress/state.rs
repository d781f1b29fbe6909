//! Progress state and the derived status snapshot.
//!
//! `ProgressState` is plain data; the tracker keeps it behind a mutex and
//! the estimator functions in [`super::eta`] derive everything else from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Mutable record of one tracked operation.
///
/// `total_steps` is fixed at construction and has no setter. `current_step`
/// is not bounded by `total_steps`; callers may over-report to signal more
/// work than planned.
#[derive(Debug, Clone)]
pub struct ProgressState {
    total_steps: u32,
    pub(crate) current_step: u32,
    pub(crate) expected_duration: f64,
    pub(crate) started_at: Option<Instant>,
    pub(crate) tokens_used: u64,
    pub(crate) tokens_expected: u64,
    pub(crate) step_descriptions: BTreeMap<u32, String>,
}

impl ProgressState {
    /// Create a fresh, unstarted state at step 0.
    pub fn new(total_steps: u32, expected_duration: f64) -> Self {
        Self {
            total_steps,
            current_step: 0,
            expected_duration,
            started_at: None,
            tokens_used: 0,
            tokens_expected: 0,
            step_descriptions: BTreeMap::new(),
        }
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn expected_duration(&self) -> f64 {
        self.expected_duration
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn tokens_expected(&self) -> u64 {
        self.tokens_expected
    }

    /// Description recorded for `step`, if any.
    pub fn description_for(&self, step: u32) -> Option<&str> {
        self.step_descriptions.get(&step).map(String::as_str)
    }

    /// Mark the state as started at `now`.
    pub(crate) fn begin(&mut self, now: Instant, tokens_expected: u64) {
        self.started_at = Some(now);
        self.tokens_expected = tokens_expected;
        self.current_step = 1;
    }

    /// Set or increment the current step and record a non-empty description
    /// against the resulting step.
    pub(crate) fn advance(&mut self, step: Option<u32>, description: Option<&str>) {
        self.current_step = match step {
            Some(step) => step,
            None => self.current_step.saturating_add(1),
        };
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            self.step_descriptions
                .insert(self.current_step, description.to_string());
        }
    }
}

/// Point-in-time view of a tracked operation.
///
/// Serialized as the JSON payload of a `STATUS|` line; field order is part
/// of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub eta_seconds: u64,
    pub current_step: u32,
    pub total_steps: u32,
    pub tokens_used: u64,
    pub tokens_expected: u64,
    pub elapsed_seconds: u64,
    pub progress_percent: u64,
    pub current_description: String,
}

/// Per-run parameters for [`super::ExecutionWrapper::run_with_tracking`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingOptions {
    /// Number of steps the work is expected to report
    pub total_steps: u32,
    /// Expected wall-clock duration in seconds, used before any progress
    pub expected_duration: f64,
    /// Expected token budget, informational only
    pub expected_tokens: u64,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            total_steps: 10,
            expected_duration: 30.0,
            expected_tokens: 0,
        }
    }
}

impl TrackingOptions {
    pub fn new(total_steps: u32, expected_duration: f64) -> Self {
        Self {
            total_steps,
            expected_duration,
            ..Self::default()
        }
    }

    pub fn with_expected_tokens(mut self, expected_tokens: u64) -> Self {
        self.expected_tokens = expected_tokens;
        self
    }
}
