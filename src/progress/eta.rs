//! ETA estimation and status formatting.
//!
//! Everything here is a pure function of a [`ProgressState`] and a wall-clock
//! instant, so the tracker's background thread and tests share one
//! implementation.
//!
//! Integers in the status payload are rounded half-to-even (`12.5` → `12`).

use super::state::{ProgressState, StatusSnapshot};
use std::time::Instant;

/// Default progress bar width in glyphs.
pub const DEFAULT_BAR_WIDTH: usize = 20;

const FILLED_GLYPH: char = '█';
const EMPTY_GLYPH: char = '░';

/// An overfilled bar renders at most this many widths of glyphs.
const MAX_OVERFILL: usize = 10;

/// Fraction of steps completed; 0 when `total_steps` is 0. Not clamped.
pub fn progress_fraction(current_step: u32, total_steps: u32) -> f64 {
    if total_steps == 0 {
        return 0.0;
    }
    f64::from(current_step) / f64::from(total_steps)
}

/// Percent complete, rounded; 0 when `total_steps` is 0. Not clamped to 100.
pub fn progress_percent(current_step: u32, total_steps: u32) -> u64 {
    (progress_fraction(current_step, total_steps) * 100.0).round_ties_even() as u64
}

/// Seconds elapsed since start, or 0 before start.
pub fn elapsed_seconds(state: &ProgressState, now: Instant) -> f64 {
    state
        .started_at()
        .map(|started| now.saturating_duration_since(started).as_secs_f64())
        .unwrap_or(0.0)
}

/// Estimated seconds remaining.
///
/// Before start this is the expected duration. Once progress is observed the
/// total time is extrapolated linearly from the elapsed time and the fraction
/// of steps completed; with no progress the expected duration minus elapsed
/// is used. Never negative.
pub fn estimate_remaining(state: &ProgressState, now: Instant) -> f64 {
    let Some(started_at) = state.started_at() else {
        return state.expected_duration();
    };

    let elapsed = now.saturating_duration_since(started_at).as_secs_f64();
    let progress = progress_fraction(state.current_step(), state.total_steps());

    let remaining = if progress > 0.0 {
        elapsed / progress - elapsed
    } else {
        state.expected_duration() - elapsed
    };
    remaining.max(0.0)
}

/// Derive the full status snapshot at `now`.
pub fn snapshot_of(state: &ProgressState, now: Instant) -> StatusSnapshot {
    let current_step = state.current_step();
    StatusSnapshot {
        eta_seconds: estimate_remaining(state, now).round_ties_even() as u64,
        current_step,
        total_steps: state.total_steps(),
        tokens_used: state.tokens_used(),
        tokens_expected: state.tokens_expected(),
        elapsed_seconds: elapsed_seconds(state, now).round_ties_even() as u64,
        progress_percent: progress_percent(current_step, state.total_steps()),
        current_description: state
            .description_for(current_step)
            .unwrap_or_default()
            .to_string(),
    }
}

/// Format seconds as `Xs`, `Xm Ys` or `Xh Ym`, truncating at each unit.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Render `[████░░░░] 50%`.
///
/// The filled count is `floor(width * percent / 100)`; percentages above 100
/// overfill the bar rather than being clamped, up to `10 * width` glyphs.
/// The percentage suffix is always the real value.
pub fn render_progress_bar(percent: u64, width: usize) -> String {
    let filled = (width as u64).saturating_mul(percent) / 100;
    let filled = usize::try_from(filled)
        .unwrap_or(usize::MAX)
        .min(width.saturating_mul(MAX_OVERFILL));
    let empty = width.saturating_sub(filled);

    let mut bar = String::with_capacity((filled + empty) * FILLED_GLYPH.len_utf8() + 8);
    bar.push('[');
    bar.extend(std::iter::repeat_n(FILLED_GLYPH, filled));
    bar.extend(std::iter::repeat_n(EMPTY_GLYPH, empty));
    bar.push(']');
    format!("{} {}%", bar, percent)
}

/// The human-readable status line, without the leading carriage return.
pub fn render_console_line(status: &StatusSnapshot, bar_width: usize) -> String {
    format!(
        "ETA: {} | Step {}/{} {}",
        format_duration(status.eta_seconds),
        status.current_step,
        status.total_steps,
        render_progress_bar(status.progress_percent, bar_width)
    )
}
