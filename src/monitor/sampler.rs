//! System resource sampling.

use sysinfo::System;

/// CPU and memory load at one instant, as percentages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Source of resource samples for the monitor thread.
pub trait ResourceSampler: Send {
    /// Take one sample, or `None` if the platform cannot report one.
    fn sample(&mut self) -> Option<ResourceSample>;
}

/// Samples the host via `sysinfo`.
///
/// CPU usage is a delta between refreshes, so the first sample after
/// construction may read as 0.
pub struct SystemSampler {
    system: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self { system }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self) -> Option<ResourceSample> {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }
        let memory_percent = (self.system.used_memory() as f64 / total as f64 * 100.0) as f32;

        Some(ResourceSample {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            memory_percent,
        })
    }
}
