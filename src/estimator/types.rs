use crate::error::{Result, TrackerError};
use crate::power::PowerModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happens to the session start time once a session stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTimePolicy {
    /// Keep the last session's start time after it stops
    Retain,
    /// Forget the start time when the session stops
    Clear,
}

impl SessionTimePolicy {
    /// Manual fixed-profile sessions keep their start time, detected ones drop it
    pub const fn default_for(model: &PowerModel) -> Self {
        match model {
            PowerModel::FixedProfile { .. } => SessionTimePolicy::Retain,
            PowerModel::MeasuredSensor { .. } => SessionTimePolicy::Clear,
        }
    }
}

/// Estimator settings, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub device_name: String,
    pub battery_capacity_kwh: f64,
    pub phase_threshold_pct: f64,
    pub power_model: PowerModel,
    pub session_time_policy: SessionTimePolicy,
    pub tick_interval_seconds: u64,
    pub initial_soc: f64,
}

impl EstimatorConfig {
    /// Fixed-profile settings with the given capacity and phase powers
    pub fn fixed_profile(
        battery_capacity_kwh: f64,
        phase_threshold_pct: f64,
        phase1_power_kw: f64,
        phase2_power_kw: f64,
    ) -> Self {
        let power_model = PowerModel::FixedProfile {
            phase1_power_kw,
            phase2_power_kw,
        };
        Self {
            device_name: "BMW CE-02".to_string(),
            battery_capacity_kwh,
            phase_threshold_pct,
            session_time_policy: SessionTimePolicy::default_for(&power_model),
            power_model,
            tick_interval_seconds: 60,
            initial_soc: 50.0,
        }
    }

    /// Measured-sensor settings with the given loss factor and detection threshold
    pub fn measured_sensor(
        battery_capacity_kwh: f64,
        phase_threshold_pct: f64,
        loss_factor: f64,
        min_charging_power_w: f64,
    ) -> Self {
        let power_model = PowerModel::MeasuredSensor {
            loss_factor,
            min_charging_power_w,
        };
        Self {
            device_name: "BMW CE-02".to_string(),
            battery_capacity_kwh,
            phase_threshold_pct,
            session_time_policy: SessionTimePolicy::default_for(&power_model),
            power_model,
            tick_interval_seconds: 60,
            initial_soc: 50.0,
        }
    }

    /// Reject settings the estimator cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.battery_capacity_kwh.is_finite() && self.battery_capacity_kwh > 0.0) {
            return Err(TrackerError::validation(
                "battery_capacity_kwh",
                "Must be positive",
            ));
        }

        if !(0.0..=100.0).contains(&self.phase_threshold_pct) {
            return Err(TrackerError::validation(
                "phase_threshold_pct",
                "Must be between 0 and 100",
            ));
        }

        if !(0.0..=100.0).contains(&self.initial_soc) {
            return Err(TrackerError::validation(
                "initial_soc",
                "Must be between 0 and 100",
            ));
        }

        if self.tick_interval_seconds == 0 {
            return Err(TrackerError::validation(
                "tick_interval_seconds",
                "Must be greater than 0",
            ));
        }

        match self.power_model {
            PowerModel::FixedProfile {
                phase1_power_kw,
                phase2_power_kw,
            } => {
                if !(phase1_power_kw.is_finite() && phase1_power_kw > 0.0) {
                    return Err(TrackerError::validation(
                        "power_model.phase1_power_kw",
                        "Must be positive",
                    ));
                }
                if !(phase2_power_kw.is_finite() && phase2_power_kw > 0.0) {
                    return Err(TrackerError::validation(
                        "power_model.phase2_power_kw",
                        "Must be positive",
                    ));
                }
            }
            PowerModel::MeasuredSensor {
                loss_factor,
                min_charging_power_w,
            } => {
                if !(loss_factor > 0.0 && loss_factor <= 1.0) {
                    return Err(TrackerError::validation(
                        "power_model.loss_factor",
                        "Must be in (0, 1]",
                    ));
                }
                if !(min_charging_power_w.is_finite() && min_charging_power_w >= 0.0) {
                    return Err(TrackerError::validation(
                        "power_model.min_charging_power_w",
                        "Must be zero or positive",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Mutable estimator state, owned by [`super::ChargeEstimator`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EstimatorState {
    /// Percent, always within [0, 100]
    pub soc: f64,
    pub is_charging: bool,
    pub soc_at_session_start: f64,
    pub session_start_time: Option<DateTime<Utc>>,
    /// Instant up to which energy has been accounted for
    pub last_integration_time: Option<DateTime<Utc>>,
    /// Latest adjusted sensor power (measured mode)
    pub last_known_power_kw: f64,
    pub total_energy_kwh: f64,
    /// Random id of the active session, used as log context
    pub session_id: Option<String>,
}

/// Derived time metrics, recomputed after every change and never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Durations {
    /// Seconds since the session started (0 when idle)
    pub elapsed_seconds: u64,
    /// Seconds until the phase threshold; `None` when it cannot be estimated
    pub seconds_to_threshold: Option<u64>,
    /// Seconds until 100%; `None` when it cannot be estimated
    pub seconds_to_full: Option<u64>,
}

/// Published view of the estimator, handed to observers and sensors
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargeStatus {
    pub timestamp: DateTime<Utc>,
    pub device_name: String,
    pub soc: f64,
    pub is_charging: bool,
    pub soc_at_session_start: Option<f64>,
    pub session_start_time: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub total_energy_kwh: f64,
    /// Power currently applied to the battery (0 when idle)
    pub current_power_kw: f64,
    pub last_known_power_kw: f64,
    pub durations: Durations,
    pub battery_capacity_kwh: f64,
    pub phase_threshold_pct: f64,
    /// Session detection threshold (measured mode only)
    pub min_charging_power_w: Option<f64>,
}
