//! Trainer configuration
//!
//! Extends the shared bootstrap settings with per-worker tuning tables:
//! `[fingerprint]`, `[model_builder]` and `[correlation_builder]`. Every key
//! is optional and falls back to the compiled default.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use suggest_common::config::BootstrapConfig;

/// Config file name (without extension) under the suggest config directory
pub const MODULE_NAME: &str = "suggest-trainer";

/// Default text marker after which record text is ignored for fingerprinting
pub const DEFAULT_CUTOFF_MARKER: &str = "#ML-CUTOFF#";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrainerConfig {
    #[serde(flatten)]
    pub bootstrap: BootstrapConfig,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub model_builder: ModelBuilderConfig,

    #[serde(default)]
    pub correlation_builder: CorrelationBuilderConfig,
}

/// Fingerprint calculator tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Sleep after a pass that found no work (seconds)
    pub idle_interval_secs: u64,
    /// Text from this marker onwards is not fingerprinted
    pub cutoff_marker: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 300,
            cutoff_marker: DEFAULT_CUTOFF_MARKER.to_string(),
        }
    }
}

impl FingerprintConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

/// Scheduling shared by both model builders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSchedule {
    /// Wait between polls when the watermark has not moved
    pub idle_interval: Duration,
    /// Short wait while the fingerprint calculator is busy
    pub busy_recheck: Duration,
    /// Pause checkpoint every N targets (0 disables pausing)
    pub pause_every: usize,
    pub pause_duration: Duration,
}

/// Text model builder tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelBuilderConfig {
    pub idle_interval_secs: u64,
    pub busy_recheck_millis: u64,
    /// Ceiling on distinct text fingerprints after pruning
    pub max_fingerprints: usize,
    pub pause_every: usize,
    pub pause_millis: u64,
}

impl Default for ModelBuilderConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 60,
            busy_recheck_millis: 2000,
            max_fingerprints: 5000,
            pause_every: 100,
            pause_millis: 1000,
        }
    }
}

impl ModelBuilderConfig {
    pub fn schedule(&self) -> SweepSchedule {
        SweepSchedule {
            idle_interval: Duration::from_secs(self.idle_interval_secs),
            busy_recheck: Duration::from_millis(self.busy_recheck_millis),
            pause_every: self.pause_every,
            pause_duration: Duration::from_millis(self.pause_millis),
        }
    }
}

/// Correlation model builder tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationBuilderConfig {
    pub idle_interval_secs: u64,
    pub busy_recheck_millis: u64,
    pub pause_every: usize,
    pub pause_millis: u64,
}

impl Default for CorrelationBuilderConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 60,
            busy_recheck_millis: 2000,
            pause_every: 100,
            pause_millis: 1000,
        }
    }
}

impl CorrelationBuilderConfig {
    pub fn schedule(&self) -> SweepSchedule {
        SweepSchedule {
            idle_interval: Duration::from_secs(self.idle_interval_secs),
            busy_recheck: Duration::from_millis(self.busy_recheck_millis),
            pause_every: self.pause_every,
            pause_duration: Duration::from_millis(self.pause_millis),
        }
    }
}
