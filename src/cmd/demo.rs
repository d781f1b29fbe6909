//! Simulated agent run (`agent-eta demo`).
//!
//! Banners go to stderr so stdout carries nothing but protocol lines.

use anyhow::{Result, bail};
use console::style;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

use agent_eta::config::EtaToml;
use agent_eta::monitor::{ResourceMonitor, SystemSampler};
use agent_eta::progress::{ExecutionWrapper, TrackingOptions, format_duration};
use agent_eta::report::ReportingChannel;

use super::super::{Complexity, DemoArgs};

const DEFAULT_TASK: &str = "AI Code Generation";
const TOKENS_PER_STEP: u64 = 100;

const INTEGRATION_HINT: &str = "To track your own agent calls, wrap them with \
ExecutionWrapper::run_with_tracking and read STATUS| lines from stdout.";

/// Shape of a simulated task.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub steps: u32,
    /// Nominal duration in seconds
    pub duration: f64,
    pub descriptions: &'static [&'static str],
}

impl Complexity {
    pub fn preset(self) -> Preset {
        match self {
            Complexity::Simple => Preset {
                steps: 3,
                duration: 5.0,
                descriptions: &["Initializing", "Processing", "Completing"],
            },
            Complexity::Medium => Preset {
                steps: 5,
                duration: 15.0,
                descriptions: &["Scanning", "Analyzing", "Building", "Testing", "Finalizing"],
            },
            Complexity::Complex => Preset {
                steps: 8,
                duration: 30.0,
                descriptions: &[
                    "Scanning",
                    "Parsing",
                    "Analyzing",
                    "Planning",
                    "Implementing",
                    "Testing",
                    "Optimizing",
                    "Reviewing",
                ],
            },
        }
    }
}

impl Preset {
    /// Sleep for step `step`; later steps run a little longer.
    fn step_delay(&self, step: u32, time_scale: f64) -> Duration {
        let per_step = self.duration / f64::from(self.steps);
        Duration::from_secs_f64(per_step * (0.8 + 0.1 * f64::from(step)) * time_scale)
    }
}

fn simulate(
    wrapper: &ExecutionWrapper,
    task: &str,
    preset: &Preset,
    time_scale: f64,
    fail_at: Option<u32>,
) -> Result<String> {
    for (step, description) in (1..).zip(preset.descriptions.iter().copied()) {
        wrapper.advance_step(Some(step), Some(description));
        thread::sleep(preset.step_delay(step, time_scale));

        if fail_at == Some(step) {
            bail!("Simulated failure at step {} ({})", step, description);
        }
        if step % 2 == 0 {
            wrapper.update_tokens(u64::from(step) * TOKENS_PER_STEP);
        }
    }
    Ok(format!("Task '{}' completed", task))
}

pub fn cmd_demo(config: &EtaToml, args: &DemoArgs) -> Result<()> {
    let task = args.task.as_deref().unwrap_or(DEFAULT_TASK);
    let complexity = args.complexity.unwrap_or_default();
    let preset = complexity.preset();
    let time_scale = args.time_scale.unwrap_or(1.0);
    if !time_scale.is_finite() || time_scale < 0.0 {
        bail!("--time-scale must be a non-negative number, got {}", time_scale);
    }
    if let Some(step) = args.fail_at
        && step > preset.steps
    {
        warn!(step, steps = preset.steps, "--fail-at is past the last step");
    }

    eprintln!();
    eprintln!("{}", style(format!("Agent task: {}", task)).bold().cyan());
    eprintln!(
        "  complexity: {:?}, steps: {}, expected: {}",
        complexity,
        preset.steps,
        format_duration((preset.duration * time_scale) as u64)
    );
    eprintln!();

    let channel = Arc::new(ReportingChannel::stdio().with_layout(config.console_layout()));
    let wrapper =
        ExecutionWrapper::with_channel(channel).with_settings(config.tracker_settings());

    let monitor = if args.monitor || config.monitor.enabled {
        let monitor = ResourceMonitor::new(config.monitor_settings());
        if let Err(e) = monitor.start(SystemSampler::new()) {
            warn!(error = %e, "Resource monitoring unavailable");
        }
        Some(monitor)
    } else {
        None
    };

    let options = TrackingOptions::new(preset.steps, preset.duration)
        .with_expected_tokens(u64::from(preset.steps) * TOKENS_PER_STEP);
    let result = wrapper.run_with_tracking(options, |w| {
        simulate(w, task, &preset, time_scale, args.fail_at)
    });

    if let Some(monitor) = monitor {
        monitor.stop();
    }

    let summary = result?;
    eprintln!("{} {}", style("✓").green(), summary);
    eprintln!();
    eprintln!("{}", style(INTEGRATION_HINT).dim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_eta::report::BufferSink;

    fn quiet_wrapper() -> (ExecutionWrapper, BufferSink) {
        let machine = BufferSink::new();
        let channel = Arc::new(ReportingChannel::new(BufferSink::new(), machine.clone()));
        (ExecutionWrapper::with_channel(channel), machine)
    }

    #[test]
    fn test_presets_match_step_counts() {
        for complexity in [Complexity::Simple, Complexity::Medium, Complexity::Complex] {
            let preset = complexity.preset();
            assert_eq!(preset.descriptions.len(), preset.steps as usize);
        }
        assert_eq!(Complexity::default(), Complexity::Medium);
    }

    #[test]
    fn test_step_delay_scales() {
        let preset = Complexity::Simple.preset();
        let full = preset.step_delay(2, 1.0);
        let tenth = preset.step_delay(2, 0.1);
        assert!((full.as_secs_f64() - 5.0 / 3.0).abs() < 1e-9);
        assert!((tenth.as_secs_f64() - full.as_secs_f64() / 10.0).abs() < 1e-9);
        assert_eq!(preset.step_delay(1, 0.0), Duration::ZERO);
    }

    #[test]
    fn test_simulate_reports_every_step() {
        let (wrapper, machine) = quiet_wrapper();
        let preset = Complexity::Medium.preset();
        let options = TrackingOptions::new(preset.steps, preset.duration);
        let summary = wrapper
            .run_with_tracking(options, |w| simulate(w, "unit", &preset, 0.0, None))
            .unwrap();

        assert_eq!(summary, "Task 'unit' completed");
        let tracker = wrapper.tracker().unwrap();
        assert_eq!(tracker.current_step(), 5);
        assert_eq!(tracker.tokens_used(), 400);
        assert_eq!(tracker.description_for(3).as_deref(), Some("Building"));
        assert_eq!(machine.lines().last().map(String::as_str), Some("STATUS|COMPLETE"));
    }

    #[test]
    fn test_simulate_fails_at_step() {
        let (wrapper, machine) = quiet_wrapper();
        let preset = Complexity::Simple.preset();
        let options = TrackingOptions::new(preset.steps, preset.duration);
        let err = wrapper
            .run_with_tracking(options, |w| simulate(w, "unit", &preset, 0.0, Some(2)))
            .unwrap_err();

        assert!(err.to_string().contains("Simulated failure at step 2 (Processing)"));
        assert_eq!(wrapper.tracker().unwrap().current_step(), 2);
        assert_eq!(machine.lines().last().map(String::as_str), Some("STATUS|COMPLETE"));
    }
}
