//! Configuration loading for sync-client.
//!
//! Configuration is loaded from a TOML file (default: `kitty-sync.toml`).
//! Every field has a default, so a partial file or no file at all works.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use sync_core::{DebouncePolicy, DuplicateGuard, FreshnessWindow, MarkerPolicy};

/// Root configuration for sync-client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Realtime cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Orchestrator configuration.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Active-session manager configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Local storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Realtime cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Freshness window in seconds (default: 86400 = 24 hours).
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Fixed delay between retries of the high-priority wave (default: 5).
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Maximum retries of the high-priority wave (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Cool-down after the last sync before a reconnect refresh (default: 30).
    #[serde(default = "default_reconnect_cooldown_secs")]
    pub reconnect_cooldown_secs: u64,
    /// Days of session history loaded by the second wave (default: 90).
    #[serde(default = "default_history_window_days")]
    pub history_window_days: u64,
}

/// Active-session manager configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Debounce delay once the session has a remote id (default: 1000).
    #[serde(default = "default_debounce_persisted_ms")]
    pub debounce_persisted_ms: u64,
    /// Debounce delay before the first create (default: 3000).
    #[serde(default = "default_debounce_first_create_ms")]
    pub debounce_first_create_ms: u64,
    /// Look-back window of the duplicate-create guard (default: 300).
    #[serde(default = "default_duplicate_guard_secs")]
    pub duplicate_guard_secs: u64,
    /// Clock proximity under which legacy copies are the same write (default: 5).
    #[serde(default = "default_legacy_proximity_secs")]
    pub legacy_proximity_secs: u64,
    /// Handled-deleted marker count that triggers collection (default: 20).
    #[serde(default = "default_handled_marker_threshold")]
    pub handled_marker_threshold: usize,
    /// Handled-deleted markers kept after collection (default: 5).
    #[serde(default = "default_handled_marker_retain")]
    pub handled_marker_retain: usize,
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory for the file-backed local store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Default value functions
fn default_freshness_window_secs() -> u64 {
    24 * 60 * 60 // 24 hours
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_reconnect_cooldown_secs() -> u64 {
    30
}

fn default_history_window_days() -> u64 {
    90
}

fn default_debounce_persisted_ms() -> u64 {
    1_000
}

fn default_debounce_first_create_ms() -> u64 {
    3_000
}

fn default_duplicate_guard_secs() -> u64 {
    5 * 60 // 5 minutes
}

fn default_legacy_proximity_secs() -> u64 {
    5
}

fn default_handled_marker_threshold() -> usize {
    20
}

fn default_handled_marker_retain() -> usize {
    5
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("kitty-data")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window_secs(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            max_retries: default_max_retries(),
            reconnect_cooldown_secs: default_reconnect_cooldown_secs(),
            history_window_days: default_history_window_days(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_persisted_ms: default_debounce_persisted_ms(),
            debounce_first_create_ms: default_debounce_first_create_ms(),
            duplicate_guard_secs: default_duplicate_guard_secs(),
            legacy_proximity_secs: default_legacy_proximity_secs(),
            handled_marker_threshold: default_handled_marker_threshold(),
            handled_marker_retain: default_handled_marker_retain(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl CacheConfig {
    /// Freshness window as a policy value.
    pub fn freshness_window(&self) -> FreshnessWindow {
        FreshnessWindow::new(Duration::from_secs(self.freshness_window_secs))
    }
}

impl OrchestratorConfig {
    /// Delay between high-priority retries.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Reconnect cool-down.
    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_cooldown_secs)
    }

    /// Length of the historical subset loaded by the second wave.
    pub fn history_window(&self) -> Duration {
        Duration::from_secs(self.history_window_days * 24 * 60 * 60)
    }
}

impl SessionConfig {
    /// Debounce delays as a policy value.
    pub fn debounce(&self) -> DebouncePolicy {
        DebouncePolicy::new(
            Duration::from_millis(self.debounce_persisted_ms),
            Duration::from_millis(self.debounce_first_create_ms),
        )
    }

    /// Duplicate-create guard.
    pub fn duplicate_guard(&self) -> DuplicateGuard {
        DuplicateGuard::new(Duration::from_secs(self.duplicate_guard_secs))
    }

    /// Legacy clock proximity.
    pub fn legacy_proximity(&self) -> Duration {
        Duration::from_secs(self.legacy_proximity_secs)
    }

    /// Handled-deleted marker collection policy.
    pub fn marker_policy(&self) -> MarkerPolicy {
        MarkerPolicy::new(self.handled_marker_threshold, self.handled_marker_retain)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}
