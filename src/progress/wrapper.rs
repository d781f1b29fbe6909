//! Run a unit of work under a fresh tracker.

use super::state::TrackingOptions;
use super::tracker::{Tracker, TrackerSettings};
use crate::report::ReportingChannel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Binds one unit of work at a time to a [`Tracker`].
///
/// The work closure receives the wrapper itself so it can report progress
/// through [`ExecutionWrapper::advance_step`] and
/// [`ExecutionWrapper::update_tokens`]. Separate wrappers share nothing and
/// can run concurrently on different threads.
///
/// Runs may nest: a `run_with_tracking` call made from inside the work of
/// another one gets its own tracker, which reports while the inner work
/// runs. When it returns, updates go to the outer tracker again. Only the
/// outermost run clears the console line and writes `STATUS|COMPLETE`, so
/// the terminal marker is always the last line of the stream.
pub struct ExecutionWrapper {
    channel: Arc<ReportingChannel>,
    settings: TrackerSettings,
    tracker: Mutex<Option<Arc<Tracker>>>,
    /// Number of runs currently in progress on this wrapper
    depth: AtomicUsize,
}

impl std::fmt::Debug for ExecutionWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionWrapper")
            .field("settings", &self.settings)
            .field("tracker", &*self.slot())
            .finish_non_exhaustive()
    }
}

impl Default for ExecutionWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionWrapper {
    /// Wrapper reporting to stderr/stdout.
    pub fn new() -> Self {
        Self::with_channel(Arc::new(ReportingChannel::stdio()))
    }

    pub fn with_channel(channel: Arc<ReportingChannel>) -> Self {
        Self {
            channel,
            settings: TrackerSettings::default(),
            tracker: Mutex::new(None),
            depth: AtomicUsize::new(0),
        }
    }

    pub fn with_settings(mut self, settings: TrackerSettings) -> Self {
        self.settings = settings;
        self
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Tracker>>> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `work` with progress reporting.
    ///
    /// A new tracker is created and started, then `work` runs on the calling
    /// thread. Whatever happens next (a value, an error or a panic) the
    /// tracker is stopped, the console line is cleared and `STATUS|COMPLETE`
    /// is written before control returns (by the outermost run only, when
    /// runs are nested). The work's result, or its error, is returned
    /// unchanged.
    ///
    /// A tracker that cannot start its reporter only loses reporting; the work
    /// still runs.
    pub fn run_with_tracking<T, E, F>(&self, options: TrackingOptions, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
    {
        let tracker = Arc::new(Tracker::with_channel(
            options.total_steps,
            options.expected_duration,
            self.settings,
            Arc::clone(&self.channel),
        ));
        let previous = self.slot().replace(Arc::clone(&tracker));
        let nested = self.depth.fetch_add(1, Ordering::AcqRel) > 0;

        let _finish = FinishGuard {
            wrapper: self,
            tracker: &tracker,
            outer: if nested { previous } else { None },
            nested,
        };

        if let Err(e) = tracker.start(options.expected_tokens) {
            warn!(error = %e, "Progress reporting unavailable for this run");
        }
        work(self)
    }

    /// Forward to the current tracker; no-op when nothing has run yet.
    pub fn advance_step(&self, step: Option<u32>, description: Option<&str>) {
        if let Some(tracker) = self.tracker() {
            tracker.advance_step(step, description);
        }
    }

    /// Forward to the current tracker; no-op when nothing has run yet.
    pub fn update_tokens(&self, tokens: u64) {
        if let Some(tracker) = self.tracker() {
            tracker.update_tokens(tokens);
        }
    }

    /// Tracker of the innermost active run, or of the most recent run.
    pub fn tracker(&self) -> Option<Arc<Tracker>> {
        self.slot().clone()
    }
}

/// Stops the tracker when dropped, which covers normal return, early error
/// return and unwinding. A nested run hands the slot back to the outer
/// tracker; the outermost run writes the terminal marker.
struct FinishGuard<'a> {
    wrapper: &'a ExecutionWrapper,
    tracker: &'a Tracker,
    outer: Option<Arc<Tracker>>,
    nested: bool,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.tracker.stop();
        if self.nested {
            *self.wrapper.slot() = self.outer.take();
        } else {
            self.wrapper.channel.finish();
        }
        self.wrapper.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run `work` under a one-off wrapper reporting to stderr/stdout.
pub fn track<T, E, F>(options: TrackingOptions, work: F) -> Result<T, E>
where
    F: FnOnce(&ExecutionWrapper) -> Result<T, E>,
{
    ExecutionWrapper::new().run_with_tracking(options, work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::BufferSink;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::thread;
    use std::time::Duration;

    fn captured() -> (ExecutionWrapper, BufferSink, BufferSink) {
        let human = BufferSink::new();
        let machine = BufferSink::new();
        let channel = Arc::new(ReportingChannel::new(human.clone(), machine.clone()));
        let wrapper = ExecutionWrapper::with_channel(channel).with_settings(TrackerSettings {
            tick_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_millis(500),
        });
        (wrapper, human, machine)
    }

    #[test]
    fn test_wrapper_starts_without_tracker() {
        let (wrapper, _, _) = captured();
        assert!(wrapper.tracker().is_none());
    }

    #[test]
    fn test_run_returns_work_result() {
        let (wrapper, _, machine) = captured();
        let result: Result<&str, ()> =
            wrapper.run_with_tracking(TrackingOptions::new(3, 1.0), |_| Ok("Task completed"));

        assert_eq!(result, Ok("Task completed"));
        assert_eq!(machine.lines().last().map(String::as_str), Some("STATUS|COMPLETE"));
    }

    #[test]
    fn test_run_passes_captured_arguments() {
        let (wrapper, _, _) = captured();
        let (x, y) = (5, 3);
        let result: Result<i32, ()> =
            wrapper.run_with_tracking(TrackingOptions::default(), |_| Ok(x + y));
        assert_eq!(result, Ok(8));
    }

    #[test]
    fn test_work_updates_reach_tracker() {
        let (wrapper, _, _) = captured();
        let result: Result<(), ()> =
            wrapper.run_with_tracking(TrackingOptions::new(5, 2.0), |w| {
                w.advance_step(Some(2), Some("Analyzing"));
                w.update_tokens(100);
                w.advance_step(None, Some("Generating"));
                Ok(())
            });
        assert!(result.is_ok());

        let tracker = wrapper.tracker().unwrap();
        assert_eq!(tracker.current_step(), 3);
        assert_eq!(tracker.tokens_used(), 100);
        assert_eq!(tracker.description_for(2).as_deref(), Some("Analyzing"));
        assert_eq!(tracker.description_for(3).as_deref(), Some("Generating"));
        assert!(!tracker.is_running());
    }

    #[test]
    fn test_error_propagates_unchanged() {
        #[derive(Debug, PartialEq)]
        struct AgentFailure(&'static str);

        let (wrapper, _, machine) = captured();
        let result: Result<(), AgentFailure> =
            wrapper.run_with_tracking(TrackingOptions::new(3, 1.0), |w| {
                w.advance_step(Some(1), None);
                Err(AgentFailure("Test error"))
            });

        assert_eq!(result, Err(AgentFailure("Test error")));
        assert_eq!(machine.lines().last().map(String::as_str), Some("STATUS|COMPLETE"));
        assert!(!wrapper.tracker().unwrap().is_running());
    }

    #[test]
    fn test_panic_still_completes() {
        let (wrapper, _, machine) = captured();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), ()> = wrapper.run_with_tracking(TrackingOptions::new(3, 1.0), |_| {
                panic!("agent crashed");
            });
        }));

        assert!(outcome.is_err());
        assert_eq!(machine.lines().last().map(String::as_str), Some("STATUS|COMPLETE"));
        assert!(!wrapper.tracker().unwrap().is_running());
    }

    #[test]
    fn test_console_line_cleared_at_end() {
        let (wrapper, human, _) = captured();
        let _: Result<(), ()> = wrapper.run_with_tracking(TrackingOptions::new(2, 1.0), |_| Ok(()));

        let contents = human.contents();
        assert!(contents.contains("ETA: "));
        assert!(contents.ends_with(&format!("\r{}\r", " ".repeat(80))));
    }

    #[test]
    fn test_updates_without_tracker_are_noops() {
        let (wrapper, human, machine) = captured();
        wrapper.advance_step(Some(5), Some("Test"));
        wrapper.update_tokens(100);
        assert!(wrapper.tracker().is_none());
        assert!(human.contents().is_empty());
        assert!(machine.contents().is_empty());
    }

    #[test]
    fn test_sequential_runs_use_fresh_trackers() {
        let (wrapper, _, machine) = captured();
        let _: Result<(), ()> = wrapper.run_with_tracking(TrackingOptions::new(2, 1.0), |w| {
            w.advance_step(Some(2), None);
            Ok(())
        });
        let first = wrapper.tracker().unwrap();

        let _: Result<(), ()> = wrapper.run_with_tracking(TrackingOptions::new(4, 1.0), |_| Ok(()));
        let second = wrapper.tracker().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.total_steps(), 4);
        assert_eq!(second.current_step(), 1);

        let completes = machine
            .lines()
            .iter()
            .filter(|l| l.as_str() == "STATUS|COMPLETE")
            .count();
        assert_eq!(completes, 2);
    }

    #[test]
    fn test_nested_run_returns_control_to_outer_tracker() {
        let (wrapper, _, machine) = captured();
        let result: Result<String, ()> =
            wrapper.run_with_tracking(TrackingOptions::new(4, 1.0), |w| {
                let outer = w.tracker().unwrap();
                let inner: Result<&str, ()> =
                    w.run_with_tracking(TrackingOptions::new(1, 1.0), |w| {
                        let inner = w.tracker().unwrap();
                        assert!(!Arc::ptr_eq(&inner, &outer));
                        assert_eq!(inner.total_steps(), 1);
                        Ok("inner")
                    });

                assert!(Arc::ptr_eq(&w.tracker().unwrap(), &outer));
                assert!(outer.is_running());
                w.advance_step(Some(3), Some("outer"));
                w.update_tokens(30);
                thread::sleep(Duration::from_millis(60));
                Ok(format!("outer-{}", inner?))
            });

        assert_eq!(result.as_deref(), Ok("outer-inner"));

        let outer = wrapper.tracker().unwrap();
        assert_eq!(outer.total_steps(), 4);
        assert_eq!(outer.current_step(), 3);
        assert_eq!(outer.tokens_used(), 30);
        assert_eq!(outer.description_for(3).as_deref(), Some("outer"));
        assert!(!outer.is_running());

        let lines = machine.lines();
        let completes: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.as_str() == "STATUS|COMPLETE")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(completes, vec![lines.len() - 1]);
        assert!(
            lines
                .iter()
                .any(|l| l.contains("\"current_step\":3") && l.contains("\"total_steps\":4"))
        );
    }

    #[test]
    fn test_nested_run_error_restores_outer_tracker() {
        let (wrapper, _, machine) = captured();
        let _: Result<(), ()> = wrapper.run_with_tracking(TrackingOptions::new(3, 1.0), |w| {
            let outer = w.tracker().unwrap();
            let inner: Result<(), &str> =
                w.run_with_tracking(TrackingOptions::new(2, 1.0), |_| Err("inner failed"));
            assert_eq!(inner, Err("inner failed"));
            assert!(Arc::ptr_eq(&w.tracker().unwrap(), &outer));
            Ok(())
        });

        let lines = machine.lines();
        assert_eq!(
            lines.iter().filter(|l| l.as_str() == "STATUS|COMPLETE").count(),
            1
        );
        assert_eq!(lines.last().map(String::as_str), Some("STATUS|COMPLETE"));
    }
}
