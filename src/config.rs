//! Configuration management for the charge tracker
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every section has defaults so partial files
//! are accepted.

use crate::error::{Result, TrackerError};
use crate::estimator::{EstimatorConfig, SessionTimePolicy};
use crate::power::PowerModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name of the tracked device, used in logs and sensor names
    pub device_name: String,

    /// Usable battery capacity in kWh
    pub battery_capacity_kwh: f64,

    /// SoC (percent) at which the charger changes phase
    pub phase_threshold_pct: f64,

    /// Interval between estimator ticks in seconds
    pub tick_interval_seconds: u64,

    /// SoC assumed when nothing has been persisted yet
    pub initial_soc: f64,

    /// Whether the session start time survives a stop (defaults per power model)
    pub session_time_policy: Option<SessionTimePolicy>,

    /// Charging power model
    pub power_model: PowerModel,

    /// External power source (measured mode)
    pub power_source: PowerSourceConfig,

    /// State persistence
    pub persistence: PersistenceConfig,

    /// Timezone for displayed completion times
    pub timezone: String,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where the host publishes the raw charging power
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PowerSourceConfig {
    /// Text file holding the latest power value in watts
    pub file: Option<String>,
}

/// State file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Path of the JSON state file
    pub file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Directory or file path for the rolling log; empty disables file logging
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "charge_tracker.yaml",
            "/data/charge_tracker.yaml",
            "/etc/charge-tracker/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Effective session-time policy for the configured power model
    pub fn session_time_policy(&self) -> SessionTimePolicy {
        self.session_time_policy
            .unwrap_or_else(|| SessionTimePolicy::default_for(&self.power_model))
    }

    /// Estimator settings derived from this configuration
    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            device_name: self.device_name.clone(),
            battery_capacity_kwh: self.battery_capacity_kwh,
            phase_threshold_pct: self.phase_threshold_pct,
            power_model: self.power_model,
            session_time_policy: self.session_time_policy(),
            tick_interval_seconds: self.tick_interval_seconds,
            initial_soc: self.initial_soc,
        }
    }

    /// Parsed display timezone
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|e| {
            TrackerError::validation("timezone", format!("{}: {}", self.timezone, e).as_str())
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            return Err(TrackerError::validation(
                "device_name",
                "Device name cannot be empty",
            ));
        }

        self.estimator_config().validate()?;

        if let PowerModel::MeasuredSensor { .. } = self.power_model
            && self
                .power_source
                .file
                .as_deref()
                .is_none_or(|f| f.trim().is_empty())
        {
            return Err(TrackerError::validation(
                "power_source.file",
                "Path is required for the measured_sensor power model",
            ));
        }

        if self.persistence.file.trim().is_empty() {
            return Err(TrackerError::validation(
                "persistence.file",
                "Path cannot be empty",
            ));
        }

        self.timezone()?;
        crate::logging::parse_log_level(&self.logging.level)?;

        Ok(())
    }
}
