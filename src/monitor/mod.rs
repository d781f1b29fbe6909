//! Resource monitor: an optional second reporter alongside the tracker.
//!
//! The monitor samples CPU and memory on its own thread and, when either
//! crosses its threshold, appends an `ETA_UPDATE:<json>` line to its sink
//! (stdout by default). It is independent of any tracker: separate
//! lifecycle, separate thread, same output stream.
//!
//! Unlike trackers the monitor can be restarted after `stop`, and a second
//! `start` while running is ignored.

pub mod sampler;

pub use sampler::{ResourceSample, ResourceSampler, SystemSampler};

use crate::errors::MonitorError;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix of every monitor line.
pub const UPDATE_PREFIX: &str = "ETA_UPDATE:";

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Monitor thresholds and timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    /// Delay between samples
    pub interval: Duration,
    /// CPU percentage above which an update is sent
    pub cpu_threshold: f32,
    /// Memory percentage above which an update is sent
    pub memory_threshold: f32,
    /// Upper bound on how long `stop` waits for the thread
    pub stop_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            cpu_threshold: 80.0,
            memory_threshold: 80.0,
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Payload of an `ETA_UPDATE:` line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceUpdate {
    System {
        cpu_percent: f32,
        memory_percent: f32,
        /// Unix time in seconds
        timestamp: f64,
    },
}

impl ResourceUpdate {
    pub fn system(sample: ResourceSample) -> Self {
        ResourceUpdate::System {
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}

struct Shared {
    running: AtomicBool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl Shared {
    fn out(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_update<T: Serialize + ?Sized>(&self, update: &T) {
        let mut out = self.out();
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let json = match serde_json::to_string(update) {
            Ok(json) => json,
            Err(e) => {
                debug!(error = %e, "Dropped unencodable monitor update");
                return;
            }
        };
        let result = writeln!(out, "{}{}", UPDATE_PREFIX, json).and_then(|()| out.flush());
        if let Err(e) = result {
            debug!(error = %e, "Dropped monitor update");
        }
    }
}

struct Worker {
    stop_tx: Sender<()>,
    exited_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Periodic CPU/memory reporter.
pub struct ResourceMonitor {
    shared: Arc<Shared>,
    settings: MonitorSettings,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ResourceMonitor {
    /// Monitor writing to stdout.
    pub fn new(settings: MonitorSettings) -> Self {
        Self::with_writer(settings, io::stdout())
    }

    pub fn with_writer(settings: MonitorSettings, out: impl Write + Send + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                out: Mutex::new(Box::new(out)),
            }),
            settings,
            worker: Mutex::new(None),
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    /// Start sampling with `sampler`. Ignored if already running.
    pub fn start(&self, sampler: impl ResourceSampler + 'static) -> Result<(), MonitorError> {
        let mut slot = self.worker_slot();
        if slot.is_some() {
            return Ok(());
        }
        self.shared.running.store(true, Ordering::Release);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (exited_tx, exited_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let settings = self.settings;

        let spawned = thread::Builder::new()
            .name("agent-eta-monitor".to_string())
            .spawn(move || {
                let _exited = exited_tx;
                monitor_loop(&shared, sampler, &settings, &stop_rx);
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(Worker {
                    stop_tx,
                    exited_rx,
                    handle,
                });
                debug!(
                    cpu_threshold = settings.cpu_threshold,
                    memory_threshold = settings.memory_threshold,
                    "Resource monitor started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(MonitorError::SpawnFailed(e))
            }
        }
    }

    /// Stop sampling. Ignored if not running.
    pub fn stop(&self) {
        let Some(worker) = self.worker_slot().take() else {
            return;
        };
        self.shared.running.store(false, Ordering::Release);
        let _ = worker.stop_tx.send(());

        match worker.exited_rx.recv_timeout(self.settings.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("Resource monitor did not exit in time, detaching");
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("Resource monitor thread panicked");
                }
                debug!("Resource monitor stopped");
            }
        }
    }

    /// Write `update` as an `ETA_UPDATE:` line.
    ///
    /// Dropped silently when the monitor is not running or the value cannot
    /// be encoded.
    pub fn send_update<T: Serialize + ?Sized>(&self, update: &T) {
        self.shared.send_update(update);
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_loop(
    shared: &Shared,
    mut sampler: impl ResourceSampler,
    settings: &MonitorSettings,
    stop_rx: &Receiver<()>,
) {
    let interval = settings.interval.max(MIN_INTERVAL);
    while shared.running.load(Ordering::Acquire) {
        if let Some(sample) = sampler.sample()
            && (sample.cpu_percent > settings.cpu_threshold
                || sample.memory_percent > settings.memory_threshold)
        {
            shared.send_update(&ResourceUpdate::system(sample));
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Resource monitor loop exited");
}
