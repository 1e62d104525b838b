//! Configuration types for the reminder and sync engines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalminderConfig {
    /// Reminder evaluation engine timing.
    pub reminders: ReminderConfig,
    /// Calendar sync scheduler timing.
    pub sync: SyncConfig,
    /// Host channel sizing.
    pub host: HostConfig,
}

/// Reminder evaluation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Seconds between ticks while healthy.
    pub tick_interval_secs: u64,
    /// How long after its fire time a reminder is still eligible to trigger.
    ///
    /// The tighter 120s window is canonical; 900s reproduces the wider
    /// variant some hosts prefer after long sleeps.
    pub due_window_secs: u64,
    /// Reminders further than this in the past are silently marked fired
    /// on the first event push.
    pub backfill_threshold_secs: u64,
    /// Base delay for exponential retry backoff in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Consecutive failures before the engine restarts itself.
    pub max_retries: u32,
    /// Delay before ticking resumes after a restart, in milliseconds.
    pub restart_cooldown_ms: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 15,
            due_window_secs: 120,
            backfill_threshold_secs: 120,
            retry_base_delay_ms: 1_000,
            max_retry_delay_ms: 300_000,
            max_retries: 5,
            restart_cooldown_ms: 5_000,
        }
    }
}

/// Calendar sync scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between sync batches while healthy.
    pub interval_secs: u64,
    /// Base delay for exponential retry backoff in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Consecutive batch failures before the scheduler restarts itself.
    pub max_retries: u32,
    /// Delay before syncing resumes after a restart, in milliseconds.
    pub restart_cooldown_ms: u64,
    /// Per-request timeout for feed fetches in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 900,
            retry_base_delay_ms: 10_000,
            max_retry_delay_ms: 30 * 60 * 1_000,
            max_retries: 3,
            restart_cooldown_ms: 30_000,
            fetch_timeout_secs: 30,
        }
    }
}

/// Host command channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Capacity of the host command request queue.
    pub request_capacity: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Capacity of each engine's command queue.
    pub engine_command_capacity: usize,
    /// Start both engines as soon as the host bridge comes up.
    pub autostart: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
            engine_command_capacity: 32,
            autostart: false,
        }
    }
}

impl CalminderConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::EngineError::Config(e.to_string()))
    }

    /// Load configuration from `path`, or defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        match Self::from_file(path) {
            Ok(config) => Ok(config),
            Err(crate::error::EngineError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/calminder/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("CALMINDER_CONFIG") {
            PathBuf::from(config)
        } else if let Some(dir) = dirs::config_dir() {
            dir.join("calminder").join("config.toml")
        } else {
            PathBuf::from("/tmp/calminder-config/config.toml")
        }
    }
}
