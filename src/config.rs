//! Configuration management for runtime parameter tuning
//!
//! This module provides runtime configuration loading from JSON files, so
//! sampling cadence, smoothing depth, and fade timing can be adjusted without
//! recompilation. User-facing settings (sensitivity, volumes) are not here;
//! those live in the coordinator's `SettingsRecord`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// Sampling loop and setup parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Period between analysis windows
    pub sample_interval_ms: u64,
    /// Capacity of the smoother's feature ring buffer
    pub history_capacity: usize,
    /// Windows required before the first stable decision
    pub min_samples: usize,
    /// Delay between audio tap attach attempts
    pub setup_backoff_ms: u64,
    /// Attach attempts before reporting the detector unavailable
    pub max_setup_retries: u32,
    /// Unanswered QueryState is re-sent after this long
    pub query_timeout_ms: u64,
    /// Re-query the coordinator this often once synced; 0 disables
    pub resync_interval_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            history_capacity: 10,
            min_samples: 3,
            setup_backoff_ms: 2000,
            max_setup_retries: 5,
            query_timeout_ms: 2000,
            resync_interval_ms: 30_000,
        }
    }
}

impl DetectorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn setup_backoff(&self) -> Duration {
        Duration::from_millis(self.setup_backoff_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_ms > 0).then(|| Duration::from_millis(self.resync_interval_ms))
    }
}

/// Volume actuator timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Duration of an eased fade
    pub fade_duration_ms: u64,
    /// Rendering tick used to sample the fade curve
    pub fade_tick_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            fade_duration_ms: 500,
            fade_tick_ms: 16,
        }
    }
}

impl ActuatorConfig {
    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }

    pub fn fade_tick(&self) -> Duration {
        Duration::from_millis(self.fade_tick_ms.max(1))
    }
}

/// Channel sizing for the coordination protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Bounded inbox size of each context
    pub inbox_capacity: usize,
    /// Broadcast buffer for observer view updates
    pub observer_buffer: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 64,
            observer_buffer: 32,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Falls back to defaults (with a warning) when the file is missing or the
    /// JSON is invalid. Missing sections take their default values.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
