//! Container configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration in milliseconds with a stable serialization format.
///
/// Serializes as a plain `u64` integer representing milliseconds, not as
/// serde's internal `{"secs": N, "nanos": N}` representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationMs(u64);

impl DurationMs {
    /// Zero duration.
    pub const ZERO: Self = Self(0);

    /// Create from milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Create from seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Get the value in milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Convert to `std::time::Duration`.
    pub fn to_std(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Duration> for DurationMs {
    fn from(d: Duration) -> Self {
        Self(d.as_millis() as u64)
    }
}

impl From<DurationMs> for Duration {
    fn from(d: DurationMs) -> Self {
        Duration::from_millis(d.0)
    }
}

impl std::fmt::Display for DurationMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// How chatty the performance monitor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    /// Log a probe only when it observes a nonzero count.
    #[default]
    Quiet,
    /// Log every probe.
    Verbose,
}

/// Configuration for a container. Every knob has a default; construct with
/// `Default` and adjust with the `with_*` methods.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Log the container-level buffered total from the monitor loop.
    pub container_monitor_enabled: bool,

    /// Log each block's own buffered count from the monitor loop.
    pub block_monitor_enabled: bool,

    /// Interval between monitor probes.
    pub monitor_interval: DurationMs,

    /// Quiet logs only nonzero counts; Verbose logs every probe.
    pub monitor_mode: MonitorMode,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            container_monitor_enabled: false,
            block_monitor_enabled: false,
            monitor_interval: DurationMs::from_secs(10),
            monitor_mode: MonitorMode::Quiet,
        }
    }
}

impl ContainerConfig {
    /// Enable container-level monitoring.
    #[must_use]
    pub fn with_container_monitor(mut self) -> Self {
        self.container_monitor_enabled = true;
        self
    }

    /// Enable block-level monitoring.
    #[must_use]
    pub fn with_block_monitor(mut self) -> Self {
        self.block_monitor_enabled = true;
        self
    }

    /// Set the monitor probe interval.
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: DurationMs) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Set the monitor verbosity.
    #[must_use]
    pub fn with_monitor_mode(mut self, mode: MonitorMode) -> Self {
        self.monitor_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_serializes_as_plain_millis() {
        let d = DurationMs::from_millis(1500);
        assert_eq!(serde_json::to_string(&d).unwrap(), "1500");
        assert_eq!(d.to_std(), Duration::from_millis(1500));
    }

    #[test]
    fn config_defaults() {
        let config = ContainerConfig::default();
        assert!(!config.container_monitor_enabled);
        assert!(!config.block_monitor_enabled);
        assert_eq!(config.monitor_interval, DurationMs::from_secs(10));
        assert_eq!(config.monitor_mode, MonitorMode::Quiet);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = ContainerConfig::default()
            .with_container_monitor()
            .with_monitor_interval(DurationMs::from_millis(250))
            .with_monitor_mode(MonitorMode::Verbose);
        let json = serde_json::to_string(&config).unwrap();
        let back: ContainerConfig = serde_json::from_str(&json).unwrap();
        assert!(back.container_monitor_enabled);
        assert_eq!(back.monitor_interval, DurationMs::from_millis(250));
        assert_eq!(back.monitor_mode, MonitorMode::Verbose);
    }
}
