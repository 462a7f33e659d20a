//! Persistence of estimator state across restarts
//!
//! The estimator exports a [`PersistedSnapshot`] which the host stores either
//! as opaque key/value attributes next to its own entity state, or through the
//! file-backed [`StateStore`]. Snapshots are read leniently: unknown keys are
//! ignored, missing keys take defaults, and values written by older releases
//! (numbers stored as strings, legacy key names) are accepted.

use crate::error::{Result, TrackerError};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Estimator state that survives a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSnapshot {
    /// Last SoC in percent
    pub soc: Option<f64>,
    /// Lifetime energy counter (kWh)
    pub total_energy_kwh: Option<f64>,
    #[serde(alias = "persisted_is_charging_flag")]
    pub is_charging: bool,
    #[serde(alias = "persisted_soc_at_charge_start_val")]
    pub soc_at_session_start: Option<f64>,
    /// RFC 3339
    #[serde(alias = "persisted_charge_start_time_val")]
    pub session_start_time: Option<String>,
    /// RFC 3339
    #[serde(alias = "persisted_last_soc_update_time_val")]
    pub last_integration_time: Option<String>,
}

const LEGACY_KEYS: [(&str, &str); 4] = [
    ("persisted_is_charging_flag", "is_charging"),
    ("persisted_soc_at_charge_start_val", "soc_at_session_start"),
    ("persisted_charge_start_time_val", "session_start_time"),
    ("persisted_last_soc_update_time_val", "last_integration_time"),
];

impl PersistedSnapshot {
    /// Export as host entity attributes
    pub fn to_attributes(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Import from host entity attributes, tolerating loosely typed values
    pub fn from_attributes(attributes: &Map<String, Value>) -> Self {
        let logger = get_logger("persistence");
        let field = |key: &str| {
            attributes.get(key).or_else(|| {
                LEGACY_KEYS
                    .iter()
                    .find(|(_, current)| *current == key)
                    .and_then(|(legacy, _)| attributes.get(*legacy))
            })
        };

        Self {
            soc: field("soc").and_then(|v| normalize_number(&logger, "soc", v)),
            total_energy_kwh: field("total_energy_kwh")
                .and_then(|v| normalize_number(&logger, "total_energy_kwh", v)),
            is_charging: field("is_charging").is_some_and(normalize_flag),
            soc_at_session_start: field("soc_at_session_start")
                .and_then(|v| normalize_number(&logger, "soc_at_session_start", v)),
            session_start_time: field("session_start_time").and_then(normalize_text),
            last_integration_time: field("last_integration_time").and_then(normalize_text),
        }
    }
}

fn normalize_number(logger: &StructuredLogger, key: &str, value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        Value::Null => return None,
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Some(f),
        _ => {
            logger.warn(&format!("Ignoring malformed persisted {}: {}", key, value));
            None
        }
    }
}

fn normalize_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let t = s.trim().to_ascii_lowercase();
            t == "1" || t == "true" || t == "on"
        }
        _ => false,
    }
}

fn normalize_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Parse a persisted RFC 3339 timestamp
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw.trim())?.with_timezone(&Utc))
}

/// Render a timestamp the way snapshots store it
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// JSON file holding the latest snapshot
pub struct StateStore {
    path: PathBuf,
    logger: StructuredLogger,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            logger: get_logger("persistence"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored snapshot; a missing file is not an error
    pub fn load(&self) -> Result<Option<PersistedSnapshot>> {
        if !self.path.exists() {
            self.logger.info(&format!(
                "No state file at {}, starting fresh",
                self.path.display()
            ));
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let value: Value = serde_json::from_str(&contents)?;
        let Value::Object(attributes) = value else {
            return Err(TrackerError::malformed_state(
                "state file",
                "Expected a JSON object",
            ));
        };

        let snapshot = PersistedSnapshot::from_attributes(&attributes);
        self.logger.info(&format!(
            "Loaded state from {} (charging: {})",
            self.path.display(),
            snapshot.is_charging
        ));
        Ok(Some(snapshot))
    }

    /// Write the snapshot, replacing the previous file atomically
    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        self.logger
            .debug(&format!("Saved state to {}", self.path.display()));
        Ok(())
    }
}
