//! Dual-sink status output.
//!
//! Every tick writes two independent records:
//! - human sink (stderr by default): a carriage-return-prefixed line that
//!   overwrites the previous one
//! - machine sink (stdout by default): an appended `STATUS|<json>` line
//!
//! Both sinks sit behind one mutex. Periodic emission re-checks the
//! tracker's `running` flag while holding it, and [`ReportingChannel::finish`]
//! writes the clear sequence and terminal marker under the same lock, so a
//! periodic record can never land after `STATUS|COMPLETE`.
//!
//! Writes are best-effort: failures are logged at `debug` and dropped.

use super::protocol::StatusLine;
use crate::progress::StatusSnapshot;
use crate::progress::eta::{DEFAULT_BAR_WIDTH, render_console_line};
use console::Term;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Width of the blank run written to erase the human line.
pub const DEFAULT_CLEAR_WIDTH: usize = 80;

/// Dimensions of the human-readable line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleLayout {
    /// Progress bar width in glyphs
    pub bar_width: usize,
    /// Number of spaces written when clearing the line
    pub clear_width: usize,
}

impl Default for ConsoleLayout {
    fn default() -> Self {
        Self {
            bar_width: DEFAULT_BAR_WIDTH,
            clear_width: DEFAULT_CLEAR_WIDTH,
        }
    }
}

struct Sinks {
    human: Box<dyn Write + Send>,
    machine: Box<dyn Write + Send>,
}

/// Human and machine status sinks shared by a wrapper and its trackers.
pub struct ReportingChannel {
    sinks: Mutex<Sinks>,
    layout: ConsoleLayout,
}

impl std::fmt::Debug for ReportingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingChannel")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl ReportingChannel {
    /// Channel over arbitrary writers.
    pub fn new(
        human: impl Write + Send + 'static,
        machine: impl Write + Send + 'static,
    ) -> Self {
        Self {
            sinks: Mutex::new(Sinks {
                human: Box::new(human),
                machine: Box::new(machine),
            }),
            layout: ConsoleLayout::default(),
        }
    }

    /// Human line on stderr, status records on stdout.
    pub fn stdio() -> Self {
        Self::new(Term::stderr(), io::stdout())
    }

    pub fn with_layout(mut self, layout: ConsoleLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> ConsoleLayout {
        self.layout
    }

    fn sinks(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one periodic record to both sinks.
    ///
    /// Skipped once `live` is cleared; the flag is read under the sink lock.
    /// Returns whether anything was written.
    pub fn emit_status(&self, status: &StatusSnapshot, live: &AtomicBool) -> bool {
        let mut sinks = self.sinks();
        if !live.load(Ordering::Acquire) {
            return false;
        }

        let console_line = render_console_line(status, self.layout.bar_width);
        write_best_effort(&mut sinks.human, "human", |w| write!(w, "\r{}", console_line));

        match StatusLine::Status(status.clone()).encode() {
            Ok(line) => write_best_effort(&mut sinks.machine, "machine", |w| writeln!(w, "{}", line)),
            Err(e) => debug!(error = %e, "Failed to encode status snapshot"),
        }
        true
    }

    /// Clear the human line and append the terminal marker.
    pub fn finish(&self) {
        let mut sinks = self.sinks();
        let blank = " ".repeat(self.layout.clear_width);
        write_best_effort(&mut sinks.human, "human", |w| write!(w, "\r{}\r", blank));
        write_best_effort(&mut sinks.machine, "machine", |w| {
            writeln!(w, "{}", StatusLine::Complete.encode().map_err(io::Error::other)?)
        });
    }
}

fn write_best_effort(
    sink: &mut Box<dyn Write + Send>,
    name: &'static str,
    write: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) {
    let result = write(sink.as_mut()).and_then(|()| sink.flush());
    if let Err(e) = result {
        debug!(sink = name, error = %e, "Dropped status write");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::BufferSink;

    fn status(step: u32, total: u32, percent: u64) -> StatusSnapshot {
        StatusSnapshot {
            eta_seconds: 5,
            current_step: step,
            total_steps: total,
            tokens_used: 0,
            tokens_expected: 0,
            elapsed_seconds: 1,
            progress_percent: percent,
            current_description: String::new(),
        }
    }

    fn channel() -> (ReportingChannel, BufferSink, BufferSink) {
        let human = BufferSink::new();
        let machine = BufferSink::new();
        (
            ReportingChannel::new(human.clone(), machine.clone()),
            human,
            machine,
        )
    }

    /// Writer that fails every call, standing in for a closed stream.
    struct ClosedStream;

    impl Write for ClosedStream {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_emit_status_writes_both_sinks() {
        let (channel, human, machine) = channel();
        let live = AtomicBool::new(true);

        assert!(channel.emit_status(&status(2, 4, 50), &live));

        assert_eq!(
            human.contents(),
            "\rETA: 5s | Step 2/4 [██████████░░░░░░░░░░] 50%"
        );
        let lines = machine.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("STATUS|{\"eta_seconds\":5"));
    }

    #[test]
    fn test_emit_status_skipped_when_not_live() {
        let (channel, human, machine) = channel();
        let live = AtomicBool::new(false);

        assert!(!channel.emit_status(&status(1, 4, 25), &live));
        assert!(human.contents().is_empty());
        assert!(machine.contents().is_empty());
    }

    #[test]
    fn test_finish_clears_and_marks_complete() {
        let (channel, human, machine) = channel();
        channel.finish();

        assert_eq!(human.contents(), format!("\r{}\r", " ".repeat(80)));
        assert_eq!(machine.lines(), vec!["STATUS|COMPLETE".to_string()]);
    }

    #[test]
    fn test_layout_controls_widths() {
        let human = BufferSink::new();
        let channel = ReportingChannel::new(human.clone(), io::sink()).with_layout(ConsoleLayout {
            bar_width: 4,
            clear_width: 3,
        });
        let live = AtomicBool::new(true);
        channel.emit_status(&status(1, 2, 50), &live);
        channel.finish();

        assert_eq!(
            human.contents(),
            "\rETA: 5s | Step 1/2 [██░░] 50%\r   \r"
        );
    }

    #[test]
    fn test_closed_streams_do_not_panic() {
        let channel = ReportingChannel::new(ClosedStream, ClosedStream);
        let live = AtomicBool::new(true);
        assert!(channel.emit_status(&status(1, 2, 50), &live));
        channel.finish();
    }
}
