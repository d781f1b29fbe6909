//! Tracker: progress state plus a background reporter thread.
//!
//! A tracker is single-use: `start` once, mutate any number of times, `stop`
//! once (further stops are no-ops). The reporter thread wakes every
//! `tick_interval`, snapshots the state and writes it to the
//! [`ReportingChannel`]. It sleeps on a stop channel rather than a plain
//! sleep, so `stop` wakes it immediately and shutdown latency is bounded by
//! whatever write is in flight.

use super::eta;
use super::state::{ProgressState, StatusSnapshot};
use crate::errors::TrackerError;
use crate::report::ReportingChannel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Floor for the tick interval; a zero interval would spin.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Timing of the reporter thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Delay between periodic emissions
    pub tick_interval: Duration,
    /// Upper bound on how long `stop` waits for the thread to exit
    pub stop_timeout: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

struct Shared {
    state: Mutex<ProgressState>,
    running: AtomicBool,
    channel: Arc<ReportingChannel>,
}

impl Shared {
    // Telemetry must not take the tracked work down with it, so a poisoned
    // lock is recovered rather than propagated.
    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> StatusSnapshot {
        eta::snapshot_of(&self.state(), Instant::now())
    }
}

struct Reporter {
    stop_tx: Sender<()>,
    /// Disconnects when the thread exits (its sender is dropped).
    exited_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Owns the progress state of one operation and its reporter thread.
pub struct Tracker {
    shared: Arc<Shared>,
    settings: TrackerSettings,
    reporter: Mutex<Option<Reporter>>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("state", &*self.shared.state())
            .field("running", &self.is_running())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Tracker {
    /// Tracker reporting to stderr/stdout with default timing.
    pub fn new(total_steps: u32, expected_duration: f64) -> Self {
        Self::with_channel(
            total_steps,
            expected_duration,
            TrackerSettings::default(),
            Arc::new(ReportingChannel::stdio()),
        )
    }

    /// Tracker reporting to `channel`.
    pub fn with_channel(
        total_steps: u32,
        expected_duration: f64,
        settings: TrackerSettings,
        channel: Arc<ReportingChannel>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ProgressState::new(total_steps, expected_duration)),
                running: AtomicBool::new(false),
                channel,
            }),
            settings,
            reporter: Mutex::new(None),
        }
    }

    fn reporter_slot(&self) -> MutexGuard<'_, Option<Reporter>> {
        self.reporter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the start time, move to step 1 and launch the reporter thread.
    ///
    /// Trackers are single-use: calling this on a tracker that was already
    /// started, including one that has since been stopped, returns
    /// [`TrackerError::AlreadyStarted`] and changes nothing.
    pub fn start(&self, tokens_expected: u64) -> Result<(), TrackerError> {
        let mut slot = self.reporter_slot();
        {
            let mut state = self.shared.state();
            if state.started_at().is_some() {
                return Err(TrackerError::AlreadyStarted);
            }
            state.begin(Instant::now(), tokens_expected);
        }
        self.shared.running.store(true, Ordering::Release);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (exited_tx, exited_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let interval = self.settings.tick_interval.max(MIN_TICK_INTERVAL);

        let spawned = thread::Builder::new()
            .name("agent-eta-reporter".to_string())
            .spawn(move || {
                let _exited = exited_tx;
                report_loop(&shared, &stop_rx, interval);
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(Reporter {
                    stop_tx,
                    exited_rx,
                    handle,
                });
                debug!(
                    total_steps = self.total_steps(),
                    tokens_expected,
                    tick_ms = interval.as_millis() as u64,
                    "Tracker started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(TrackerError::SpawnFailed(e))
            }
        }
    }

    /// Set the current step, or increment it when `step` is `None`.
    ///
    /// A non-empty `description` is recorded against the resulting step.
    pub fn advance_step(&self, step: Option<u32>, description: Option<&str>) {
        self.shared.state().advance(step, description);
    }

    /// Set the absolute number of tokens used so far.
    pub fn update_tokens(&self, tokens: u64) {
        self.shared.state().tokens_used = tokens;
    }

    /// Stop the reporter and wait, at most `stop_timeout`, for it to exit.
    ///
    /// No-op if the tracker was never started or is already stopped. A thread
    /// that misses the deadline is detached; the `running` flag it re-checks
    /// under the sink lock keeps it from emitting again.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);

        let Some(reporter) = self.reporter_slot().take() else {
            return;
        };
        // The thread may already be gone; a failed send is fine.
        let _ = reporter.stop_tx.send(());

        match reporter.exited_rx.recv_timeout(self.settings.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.settings.stop_timeout.as_millis() as u64,
                    "Reporter thread did not exit in time, detaching"
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if reporter.handle.join().is_err() {
                    warn!("Reporter thread panicked");
                }
                debug!("Tracker stopped");
            }
        }
    }

    /// Estimated seconds remaining.
    pub fn compute_eta(&self) -> f64 {
        eta::estimate_remaining(&self.shared.state(), Instant::now())
    }

    /// Derived status at this instant.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    /// Copy of the raw progress state.
    pub fn progress_state(&self) -> ProgressState {
        self.shared.state().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn total_steps(&self) -> u32 {
        self.shared.state().total_steps()
    }

    pub fn current_step(&self) -> u32 {
        self.shared.state().current_step()
    }

    pub fn tokens_used(&self) -> u64 {
        self.shared.state().tokens_used()
    }

    pub fn tokens_expected(&self) -> u64 {
        self.shared.state().tokens_expected()
    }

    pub fn description_for(&self, step: u32) -> Option<String> {
        self.shared.state().description_for(step).map(str::to_string)
    }

    pub fn channel(&self) -> &Arc<ReportingChannel> {
        &self.shared.channel
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn report_loop(shared: &Shared, stop_rx: &Receiver<()>, interval: Duration) {
    while shared.running.load(Ordering::Acquire) {
        let status = shared.snapshot();
        shared.channel.emit_status(&status, &shared.running);

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Reporter loop exited");
}
