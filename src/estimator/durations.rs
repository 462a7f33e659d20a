use super::{ChargeEstimator, Durations};
use crate::error::{Result, TrackerError};
use crate::power::PowerModel;
use chrono::{DateTime, Utc};

/// Lower bound on the measured rate used for time estimates (kW)
pub const MEASURED_ESTIMATION_FLOOR_KW: f64 = 0.2;

/// Seconds needed to reach `threshold_pct` at a constant `rate_kw`
///
/// Returns 0 when the SoC is already at or above the threshold.
pub fn seconds_to_threshold(
    soc: f64,
    threshold_pct: f64,
    capacity_kwh: f64,
    rate_kw: f64,
) -> Result<u64> {
    if soc >= threshold_pct {
        return Ok(0);
    }
    if rate_kw <= 0.0 {
        return Err(TrackerError::missing_rate("phase threshold"));
    }
    let energy_kwh = (threshold_pct - soc) / 100.0 * capacity_kwh;
    Ok((energy_kwh / rate_kw * 3600.0).round() as u64)
}

/// Seconds needed to reach 100%, charging at `phase1_kw` below the threshold
/// and `phase2_kw` from the threshold on
pub fn seconds_to_full(
    soc: f64,
    threshold_pct: f64,
    capacity_kwh: f64,
    phase1_kw: f64,
    phase2_kw: f64,
) -> Result<u64> {
    if soc >= 100.0 {
        return Ok(0);
    }

    let mut hours = 0.0;
    if soc < threshold_pct {
        if phase1_kw <= 0.0 {
            return Err(TrackerError::missing_rate("full (phase 1)"));
        }
        hours += (threshold_pct - soc) / 100.0 * capacity_kwh / phase1_kw;
    }

    let phase2_from = soc.max(threshold_pct);
    if phase2_from < 100.0 {
        if phase2_kw <= 0.0 {
            return Err(TrackerError::missing_rate("full (phase 2)"));
        }
        hours += (100.0 - phase2_from) / 100.0 * capacity_kwh / phase2_kw;
    }

    Ok((hours * 3600.0).round() as u64)
}

impl ChargeEstimator {
    /// Elapsed and remaining times for the current state
    pub(super) fn derive_durations(&self, now: DateTime<Utc>) -> Durations {
        let soc = self.state.soc;
        let threshold = self.config.phase_threshold_pct;

        if !self.state.is_charging {
            return Durations {
                elapsed_seconds: 0,
                seconds_to_threshold: (soc >= threshold).then_some(0),
                seconds_to_full: (soc >= 100.0).then_some(0),
            };
        }

        let elapsed_seconds = self
            .state
            .session_start_time
            .map(|start| ((now - start).num_milliseconds().max(0) as f64 / 1000.0).round() as u64)
            .unwrap_or(0);

        let (rate1, rate2) = self.estimation_rates();
        let capacity = self.config.battery_capacity_kwh;
        let logger = self.session_logger();

        let seconds_to_threshold = seconds_to_threshold(soc, threshold, capacity, rate1)
            .inspect_err(|e| logger.debug(&e.to_string()))
            .ok();
        let seconds_to_full = seconds_to_full(soc, threshold, capacity, rate1, rate2)
            .inspect_err(|e| logger.debug(&e.to_string()))
            .ok();

        Durations {
            elapsed_seconds,
            seconds_to_threshold,
            seconds_to_full,
        }
    }

    /// Charging rates (kW) assumed below and above the threshold
    fn estimation_rates(&self) -> (f64, f64) {
        match self.config.power_model {
            PowerModel::FixedProfile {
                phase1_power_kw,
                phase2_power_kw,
            } => (phase1_power_kw, phase2_power_kw),
            PowerModel::MeasuredSensor { .. } => {
                let last = self.state.last_known_power_kw;
                if last <= 0.0 {
                    (0.0, 0.0)
                } else {
                    let rate = last.max(MEASURED_ESTIMATION_FLOOR_KW);
                    (rate, rate)
                }
            }
        }
    }
}
