//! Configuration file for agent-eta.
//!
//! Settings live in `agent-eta.toml`. Every section and key is optional;
//! missing values fall back to the library defaults.
//!
//! ```toml
//! [defaults]
//! total_steps = 10
//! expected_duration = 30.0
//! expected_tokens = 0
//!
//! [reporter]
//! tick_interval_ms = 500
//! stop_timeout_ms = 500
//! bar_width = 20
//! clear_width = 80
//!
//! [monitor]
//! enabled = false
//! interval_ms = 500
//! cpu_threshold = 80.0
//! memory_threshold = 80.0
//! ```
//!
//! Layering is file, then environment (`AGENT_ETA_TICK_MS`), then CLI flags.

use crate::monitor::MonitorSettings;
use crate::progress::{TrackerSettings, TrackingOptions};
use crate::report::{ConsoleLayout, DEFAULT_CLEAR_WIDTH};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up by [`EtaToml::load_or_default`].
pub const CONFIG_FILE_NAME: &str = "agent-eta.toml";

/// Overrides `[reporter] tick_interval_ms`.
pub const TICK_ENV_VAR: &str = "AGENT_ETA_TICK_MS";

/// Tracking defaults used when the caller does not supply its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_total_steps")]
    pub total_steps: u32,
    /// Seconds
    #[serde(default = "default_expected_duration")]
    pub expected_duration: f64,
    #[serde(default)]
    pub expected_tokens: u64,
}

fn default_total_steps() -> u32 {
    10
}

fn default_expected_duration() -> f64 {
    30.0
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            total_steps: default_total_steps(),
            expected_duration: default_expected_duration(),
            expected_tokens: 0,
        }
    }
}

/// Reporter thread timing and console layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterSection {
    #[serde(default = "default_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
    #[serde(default = "default_clear_width")]
    pub clear_width: usize,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_bar_width() -> usize {
    crate::progress::eta::DEFAULT_BAR_WIDTH
}

fn default_clear_width() -> usize {
    DEFAULT_CLEAR_WIDTH
}

impl Default for ReporterSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_interval_ms(),
            stop_timeout_ms: default_interval_ms(),
            bar_width: default_bar_width(),
            clear_width: default_clear_width(),
        }
    }
}

/// Resource monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Run the monitor alongside the demo without `--monitor`
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_threshold")]
    pub cpu_threshold: f32,
    #[serde(default = "default_threshold")]
    pub memory_threshold: f32,
}

fn default_threshold() -> f32 {
    80.0
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_interval_ms(),
            cpu_threshold: default_threshold(),
            memory_threshold: default_threshold(),
        }
    }
}

/// The complete agent-eta.toml structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EtaToml {
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub reporter: ReporterSection,
    #[serde(default)]
    pub monitor: MonitorSection,
}

impl EtaToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse agent-eta.toml")
    }

    /// Load `agent-eta.toml` from `dir`, or defaults if it doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = Self::path_in(dir);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE_NAME)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize agent-eta.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Tick interval, with `AGENT_ETA_TICK_MS` taking precedence over the file.
    pub fn tick_interval_ms(&self) -> u64 {
        tick_override(std::env::var(TICK_ENV_VAR).ok().as_deref())
            .unwrap_or(self.reporter.tick_interval_ms)
    }

    pub fn tracking_options(&self) -> TrackingOptions {
        TrackingOptions::new(self.defaults.total_steps, self.defaults.expected_duration)
            .with_expected_tokens(self.defaults.expected_tokens)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms()),
            stop_timeout: Duration::from_millis(self.reporter.stop_timeout_ms),
        }
    }

    pub fn console_layout(&self) -> ConsoleLayout {
        ConsoleLayout {
            bar_width: self.reporter.bar_width,
            clear_width: self.reporter.clear_width,
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_millis(self.monitor.interval_ms),
            cpu_threshold: self.monitor.cpu_threshold,
            memory_threshold: self.monitor.memory_threshold,
            ..MonitorSettings::default()
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.reporter.tick_interval_ms == 0 {
            warnings.push(
                "reporter.tick_interval_ms is 0: updates will be sent every 10ms".to_string(),
            );
        }
        if self.monitor.interval_ms == 0 {
            warnings.push(
                "monitor.interval_ms is 0: samples will be taken every 10ms".to_string(),
            );
        }
        if self.defaults.expected_duration < 0.0 {
            warnings.push(format!(
                "defaults.expected_duration is negative ({}): ETA will always be 0",
                self.defaults.expected_duration
            ));
        }
        if self.defaults.total_steps == 0 {
            warnings.push("defaults.total_steps is 0: progress will read 0%".to_string());
        }
        for (name, value) in [
            ("monitor.cpu_threshold", self.monitor.cpu_threshold),
            ("monitor.memory_threshold", self.monitor.memory_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                warnings.push(format!(
                    "{} is {}: should be a percentage between 0 and 100",
                    name, value
                ));
            }
        }

        warnings
    }
}

/// Parse a tick override value; blank or non-numeric values are ignored.
fn tick_override(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}
