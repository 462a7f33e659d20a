//! Charging power models and external power sources
//!
//! The estimator either derives charging power from the current SoC (a fixed
//! two-phase profile) or reads it from a host-provided power sensor. Sensor
//! reads are non-blocking lookups of a cached value and never fail: anything
//! that is not a finite number of watts is reported as
//! [`PowerReading::Unavailable`].

use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Smallest interval integrated by the fixed profile (seconds)
pub const FIXED_PROFILE_MIN_INTERVAL_S: f64 = 1.0;

/// Smallest interval integrated from measured power (seconds)
pub const MEASURED_MIN_INTERVAL_S: f64 = 0.1;

/// How the charging power is obtained
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PowerModel {
    /// Power depends only on SoC: `phase1` below the threshold, `phase2` above
    FixedProfile {
        /// Charger power below the phase threshold (kW)
        phase1_power_kw: f64,
        /// Charger power at or above the phase threshold (kW)
        phase2_power_kw: f64,
    },

    /// Power is read from an external sensor and reduced by a loss factor
    MeasuredSensor {
        /// Multiplier applied to raw sensor watts, in (0, 1]
        loss_factor: f64,
        /// Adjusted power above which a session is considered active (W)
        min_charging_power_w: f64,
    },
}

impl PowerModel {
    /// Charger profile used by the CE-02 1 kW charger
    pub const fn ce02_fixed_profile() -> Self {
        PowerModel::FixedProfile {
            phase1_power_kw: 0.9,
            phase2_power_kw: 0.517,
        }
    }

    /// Measured mode with the CE-02 charger's 8% conversion loss
    pub const fn ce02_measured() -> Self {
        PowerModel::MeasuredSensor {
            loss_factor: 0.92,
            min_charging_power_w: 10.0,
        }
    }

    /// Whether sessions are detected from the power signal
    pub const fn is_measured(&self) -> bool {
        matches!(self, PowerModel::MeasuredSensor { .. })
    }

    /// Integration steps shorter than this are skipped unless forced
    pub const fn min_integration_interval(&self) -> f64 {
        match self {
            PowerModel::FixedProfile { .. } => FIXED_PROFILE_MIN_INTERVAL_S,
            PowerModel::MeasuredSensor { .. } => MEASURED_MIN_INTERVAL_S,
        }
    }

    /// Fixed-profile power for a given SoC; `None` for measured mode
    pub fn phase_power_kw(&self, soc: f64, threshold_pct: f64) -> Option<f64> {
        match *self {
            PowerModel::FixedProfile {
                phase1_power_kw,
                phase2_power_kw,
            } => {
                if soc >= 100.0 {
                    Some(0.0)
                } else if soc < threshold_pct {
                    Some(phase1_power_kw)
                } else {
                    Some(phase2_power_kw)
                }
            }
            PowerModel::MeasuredSensor { .. } => None,
        }
    }
}

/// A single lookup of the external power sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerReading {
    /// Raw sensor value in watts
    Watts(f64),
    /// Sensor missing, unknown, unavailable or unparseable
    Unavailable,
}

impl PowerReading {
    /// Interpret a host state string the way entity states are reported
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("unknown")
            || trimmed.eq_ignore_ascii_case("unavailable")
        {
            return PowerReading::Unavailable;
        }
        match trimmed.replace(',', ".").parse::<f64>() {
            Ok(w) => Self::from_watts(w),
            Err(_) => {
                get_logger("power").warn(&format!("Could not parse power value: '{}'", trimmed));
                PowerReading::Unavailable
            }
        }
    }

    /// Wrap a numeric value, rejecting NaN and infinities
    pub fn from_watts(watts: f64) -> Self {
        if watts.is_finite() {
            PowerReading::Watts(watts)
        } else {
            PowerReading::Unavailable
        }
    }

    /// Raw watts, 0 when unavailable
    pub fn watts_or_zero(&self) -> f64 {
        match self {
            PowerReading::Watts(w) => *w,
            PowerReading::Unavailable => 0.0,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PowerReading::Watts(_))
    }
}

/// Read-only, non-blocking lookup of the current charging power
pub trait PowerSource: Send + Sync {
    /// Current raw sensor value
    fn read(&self) -> PowerReading;

    /// Human-readable identifier for logs
    fn describe(&self) -> String {
        "power source".to_string()
    }
}

/// Power value pushed by the host (e.g. from a state-changed event)
#[derive(Debug, Clone)]
pub struct SharedPowerSource {
    name: String,
    latest: Arc<RwLock<PowerReading>>,
}

impl SharedPowerSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latest: Arc::new(RwLock::new(PowerReading::Unavailable)),
        }
    }

    /// Store a numeric value in watts
    pub fn set_watts(&self, watts: f64) {
        self.set(PowerReading::from_watts(watts));
    }

    /// Store a raw host state string
    pub fn set_state(&self, raw: &str) {
        self.set(PowerReading::parse(raw));
    }

    pub fn set_unavailable(&self) {
        self.set(PowerReading::Unavailable);
    }

    fn set(&self, reading: PowerReading) {
        if let Ok(mut guard) = self.latest.write() {
            *guard = reading;
        }
    }
}

impl PowerSource for SharedPowerSource {
    fn read(&self) -> PowerReading {
        self.latest
            .read()
            .map(|guard| *guard)
            .unwrap_or(PowerReading::Unavailable)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Power value read from a small text file written by the host
///
/// `read()` returns the value cached by the last [`FilePowerSource::refresh`],
/// so the tick never touches the filesystem. The file is read with
/// `tokio::fs` from a polling task ([`FilePowerSource::spawn_polling`]).
#[derive(Debug, Clone)]
pub struct FilePowerSource {
    path: PathBuf,
    latest: SharedPowerSource,
}

impl FilePowerSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let latest = SharedPowerSource::new(&path.display().to_string());
        Self { path, latest }
    }

    /// Re-read the file and cache its value
    pub async fn refresh(&self) -> PowerReading {
        let reading = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => PowerReading::parse(&contents),
            Err(_) => PowerReading::Unavailable,
        };
        self.latest.set(reading);
        reading
    }

    /// Refresh the cached value every `period` until the task is aborted
    pub fn spawn_polling(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.refresh().await;
            }
        })
    }
}

impl PowerSource for FilePowerSource {
    fn read(&self) -> PowerReading {
        self.latest.read()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_numbers_and_rejects_sentinels() {
        assert_eq!(PowerReading::parse("50"), PowerReading::Watts(50.0));
        assert_eq!(PowerReading::parse(" 12.5\n"), PowerReading::Watts(12.5));
        assert_eq!(PowerReading::parse("7,5"), PowerReading::Watts(7.5));
        assert_eq!(PowerReading::parse("unavailable"), PowerReading::Unavailable);
        assert_eq!(PowerReading::parse("Unknown"), PowerReading::Unavailable);
        assert_eq!(PowerReading::parse(""), PowerReading::Unavailable);
        assert_eq!(PowerReading::parse("abc"), PowerReading::Unavailable);
        assert_eq!(PowerReading::parse("NaN"), PowerReading::Unavailable);
        assert_eq!(PowerReading::parse("inf"), PowerReading::Unavailable);
    }

    #[test]
    fn phase_power_switches_at_threshold() {
        let model = PowerModel::ce02_fixed_profile();
        assert_eq!(model.phase_power_kw(79.9, 80.0), Some(0.9));
        assert_eq!(model.phase_power_kw(80.0, 80.0), Some(0.517));
        assert_eq!(model.phase_power_kw(100.0, 80.0), Some(0.0));
        assert_eq!(PowerModel::ce02_measured().phase_power_kw(10.0, 80.0), None);
    }

    #[test]
    fn min_interval_depends_on_model() {
        assert_eq!(PowerModel::ce02_fixed_profile().min_integration_interval(), 1.0);
        assert_eq!(PowerModel::ce02_measured().min_integration_interval(), 0.1);
    }

    #[test]
    fn shared_source_reflects_latest_value() {
        let src = SharedPowerSource::new("sensor.plug_power");
        assert_eq!(src.read(), PowerReading::Unavailable);
        src.set_watts(42.0);
        assert_eq!(src.read(), PowerReading::Watts(42.0));
        src.set_state("unavailable");
        assert_eq!(src.read().watts_or_zero(), 0.0);
        assert_eq!(src.describe(), "sensor.plug_power");
    }

    #[tokio::test]
    async fn file_source_serves_cached_value_between_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let src = FilePowerSource::new(dir.path().join("missing"));
        assert_eq!(src.refresh().await, PowerReading::Unavailable);
        assert_eq!(src.read(), PowerReading::Unavailable);

        let path = dir.path().join("power");
        std::fs::write(&path, "63.0\n").unwrap();
        let src = FilePowerSource::new(&path);
        assert_eq!(src.read(), PowerReading::Unavailable);
        assert_eq!(src.refresh().await, PowerReading::Watts(63.0));

        std::fs::write(&path, "12.0\n").unwrap();
        assert_eq!(src.read(), PowerReading::Watts(63.0));
        src.refresh().await;
        assert_eq!(src.read(), PowerReading::Watts(12.0));
    }

    #[tokio::test]
    async fn polling_task_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("power");
        std::fs::write(&path, "40").unwrap();
        let src = Arc::new(FilePowerSource::new(&path));

        let handle = Arc::clone(&src).spawn_polling(Duration::from_millis(10));
        for _ in 0..100 {
            if src.read() == PowerReading::Watts(40.0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(src.read(), PowerReading::Watts(40.0));
        handle.abort();
    }

    #[test]
    fn power_model_yaml_is_tagged() {
        let yaml = "type: measured_sensor\nloss_factor: 0.92\nmin_charging_power_w: 10.0\n";
        let model: PowerModel = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(model, PowerModel::ce02_measured());
    }
}
