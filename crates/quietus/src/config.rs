use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::{
    DEFAULT_MONITOR_INTERVAL_SECS, DEFAULT_SHUTDOWN_WAIT, DEFAULT_STOP_RETRY, DEFAULT_STOP_WAIT,
    Timings,
};
use crate::schedule::{BinaryDefinition, Schedule, ScheduleEntry};

// ============================================================================
// Config (root)
// ============================================================================

/// Schedule description file as written by the user.
///
/// Maps are ordered by name, so processes whose first start coincides are
/// started in name order.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub binaries: BTreeMap<String, BinaryConfig>,
    #[serde(default)]
    pub schedule: BTreeMap<String, ScheduleConfig>,
    #[serde(default)]
    pub settings: SettingsConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).await?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_saphyr::from_str(contents)?)
    }

    /// Validate and resolve every schedule entry against its binary.
    pub fn resolve(&self) -> Result<Schedule, ConfigError> {
        let mut binaries: BTreeMap<&str, Arc<BinaryDefinition>> = BTreeMap::new();
        for (name, binary) in &self.binaries {
            let location = binary
                .location
                .as_deref()
                .filter(|l| !l.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingLocation {
                    binary: name.clone(),
                })?;
            binaries.insert(
                name.as_str(),
                Arc::new(BinaryDefinition {
                    name: name.clone(),
                    location: PathBuf::from(location),
                    arguments: binary.arguments.clone(),
                }),
            );
        }

        let mut entries = Vec::with_capacity(self.schedule.len());
        for (name, item) in &self.schedule {
            let binary = binaries.get(item.binary.as_str()).cloned().ok_or_else(|| {
                ConfigError::UnknownBinary {
                    process: name.clone(),
                    binary: item.binary.clone(),
                }
            })?;

            entries.push(Arc::new(ScheduleEntry {
                name: name.clone(),
                binary,
                extra_arguments: item.arguments.clone(),
                start_after: seconds(name, "start_after", item.start_after)?,
                death_after: item
                    .death_after
                    .map(|v| seconds(name, "death_after", v))
                    .transpose()?,
                restart_after: item
                    .restart_after
                    .map(|v| seconds(name, "restart_after", v))
                    .transpose()?,
            }));
        }

        Ok(Schedule {
            entries,
            timings: self.settings.timings()?,
        })
    }
}

// ============================================================================
// BinaryConfig
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinaryConfig {
    /// Path to the executable. Checked in [`Config::resolve`] so a missing
    /// value is reported with the binary's name.
    #[serde(default, alias = "path")]
    pub location: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
}

// ============================================================================
// ScheduleConfig
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    pub binary: String,
    #[serde(default)]
    pub start_after: f64,
    #[serde(default)]
    pub death_after: Option<f64>,
    #[serde(default, alias = "restart_delay")]
    pub restart_after: Option<f64>,
    /// Appended to the binary's arguments.
    #[serde(default)]
    pub arguments: Vec<String>,
}

// ============================================================================
// SettingsConfig
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsConfig {
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_seconds: f64,
    #[serde(default = "default_stop_wait")]
    pub stop_wait_seconds: f64,
    #[serde(default = "default_shutdown_wait")]
    pub shutdown_wait_seconds: f64,
    #[serde(default = "default_stop_retry")]
    pub stop_retry_seconds: f64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            monitor_interval_seconds: default_monitor_interval(),
            stop_wait_seconds: default_stop_wait(),
            shutdown_wait_seconds: default_shutdown_wait(),
            stop_retry_seconds: default_stop_retry(),
        }
    }
}

impl SettingsConfig {
    pub fn timings(&self) -> Result<Timings, ConfigError> {
        let monitor_interval = seconds(
            "settings",
            "monitor_interval_seconds",
            self.monitor_interval_seconds,
        )?;
        if monitor_interval.is_zero() {
            return Err(ConfigError::InvalidDuration {
                owner: "settings".to_string(),
                field: "monitor_interval_seconds",
                value: self.monitor_interval_seconds,
            });
        }
        Ok(Timings {
            monitor_interval,
            stop_wait: seconds("settings", "stop_wait_seconds", self.stop_wait_seconds)?,
            shutdown_wait: seconds(
                "settings",
                "shutdown_wait_seconds",
                self.shutdown_wait_seconds,
            )?,
            stop_retry: seconds("settings", "stop_retry_seconds", self.stop_retry_seconds)?,
        })
    }
}

fn default_monitor_interval() -> f64 {
    DEFAULT_MONITOR_INTERVAL_SECS as f64
}

fn default_stop_wait() -> f64 {
    DEFAULT_STOP_WAIT.as_secs_f64()
}

fn default_shutdown_wait() -> f64 {
    DEFAULT_SHUTDOWN_WAIT.as_secs_f64()
}

fn default_stop_retry() -> f64 {
    DEFAULT_STOP_RETRY.as_secs_f64()
}

/// Upper bound for any configured delay (100 years). Larger values would
/// overflow the monotonic clock once added to the current instant.
const MAX_SECONDS: f64 = 100.0 * 365.0 * 24.0 * 60.0 * 60.0;

fn seconds(owner: &str, field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|_| value <= MAX_SECONDS)
        .ok_or_else(|| ConfigError::InvalidDuration {
            owner: owner.to_string(),
            field,
            value,
        })
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read schedule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse schedule file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("process '{process}' references unknown binary '{binary}'")]
    UnknownBinary { process: String, binary: String },

    #[error("binary '{binary}' has no location")]
    MissingLocation { binary: String },

    #[error("invalid {field} for '{owner}': {value}")]
    InvalidDuration {
        owner: String,
        field: &'static str,
        value: f64,
    },
}

// ============================================================================
// Tests
// ============================================================================
