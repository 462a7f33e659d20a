//! Presentation of the estimator status as host sensor values
//!
//! These helpers are pure functions over [`ChargeStatus`]; hosts call them
//! from an observer to refresh their entities.

use crate::estimator::ChargeStatus;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;

/// Shown when the phase threshold has been reached
pub const STATUS_REACHED: &str = "Reached";
/// Shown when the battery is full
pub const STATUS_FULL: &str = "Full";
/// Shown when no estimate is possible
pub const STATUS_UNAVAILABLE: &str = "Unavailable";

/// Render seconds as `HH:MM`; hours are not wrapped at 24
pub fn format_hhmm(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

pub fn time_to_threshold_display(status: &ChargeStatus) -> String {
    if status.soc >= status.phase_threshold_pct {
        return STATUS_REACHED.to_string();
    }
    status
        .durations
        .seconds_to_threshold
        .map_or_else(|| STATUS_UNAVAILABLE.to_string(), format_hhmm)
}

pub fn time_to_full_display(status: &ChargeStatus) -> String {
    if status.soc >= 100.0 {
        return STATUS_FULL.to_string();
    }
    status
        .durations
        .seconds_to_full
        .map_or_else(|| STATUS_UNAVAILABLE.to_string(), format_hhmm)
}

/// Charging with power below half the detection threshold ("plugged in")
pub fn is_low_power(status: &ChargeStatus) -> bool {
    status.is_charging
        && status
            .min_charging_power_w
            .is_some_and(|min_w| status.current_power_kw * 1000.0 < min_w / 2.0)
}

/// Material Design battery icon for a SoC level
pub fn battery_icon(soc: Option<f64>, charging: bool, low_power: bool) -> String {
    let Some(soc) = soc else {
        return "mdi:battery-unknown".to_string();
    };

    let base = match (charging, low_power && soc < 99.0) {
        (false, _) => "mdi:battery",
        (true, true) => "mdi:battery-plus",
        (true, false) => "mdi:battery-charging",
    };

    if soc >= 95.0 {
        return base.to_string();
    }
    if soc <= 5.0 {
        return if charging {
            format!("{}-alert-variant-outline", base)
        } else {
            format!("{}-outline", base)
        };
    }

    let level = [85.0, 75.0, 65.0, 55.0, 45.0, 35.0, 25.0, 15.0]
        .iter()
        .position(|floor| soc >= *floor)
        .map_or(10, |idx| 90 - 10 * idx);
    format!("{}-{}", base, level)
}

/// Values a host publishes for one device, rounded for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReadings {
    pub soc: f64,
    pub is_charging: bool,
    pub total_energy_kwh: f64,
    pub current_power_kw: f64,
    pub elapsed_seconds: u64,
    pub time_to_threshold: String,
    pub time_to_full: String,
    pub soc_at_session_start: Option<f64>,
    pub session_start_time: Option<String>,
    /// Estimated instant the threshold is reached, or a status word
    pub time_at_threshold: Option<String>,
    /// Estimated instant the battery is full, or a status word
    pub time_at_full: Option<String>,
    pub icon: String,
}

impl SensorReadings {
    pub fn from_status<Tz>(status: &ChargeStatus, tz: &Tz, now: DateTime<Utc>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let local = |ts: DateTime<Utc>| ts.with_timezone(tz).to_rfc3339();
        let eta = |reached: bool, sentinel: &str, seconds: Option<u64>| {
            if reached {
                return Some(sentinel.to_string());
            }
            seconds
                .filter(|s| *s > 0)
                .and_then(|s| i64::try_from(s).ok())
                .and_then(TimeDelta::try_seconds)
                .and_then(|d| now.checked_add_signed(d))
                .map(local)
        };

        Self {
            soc: round_to(status.soc, 1),
            is_charging: status.is_charging,
            total_energy_kwh: round_to(status.total_energy_kwh, 3),
            current_power_kw: round_to(status.current_power_kw, 3),
            elapsed_seconds: status.durations.elapsed_seconds,
            time_to_threshold: time_to_threshold_display(status),
            time_to_full: time_to_full_display(status),
            soc_at_session_start: status.soc_at_session_start.map(|s| round_to(s, 1)),
            session_start_time: status
                .session_start_time
                .filter(|_| status.is_charging)
                .map(local),
            time_at_threshold: eta(
                status.soc >= status.phase_threshold_pct,
                STATUS_REACHED,
                status.durations.seconds_to_threshold,
            ),
            time_at_full: eta(
                status.soc >= 100.0,
                STATUS_FULL,
                status.durations.seconds_to_full,
            ),
            icon: battery_icon(Some(status.soc), status.is_charging, is_low_power(status)),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::Durations;

    fn status(soc: f64, charging: bool) -> ChargeStatus {
        ChargeStatus {
            soc,
            is_charging: charging,
            phase_threshold_pct: 80.0,
            battery_capacity_kwh: 3.92,
            ..Default::default()
        }
    }

    #[test]
    fn hhmm_does_not_wrap_hours() {
        assert_eq!(format_hhmm(0), "00:00");
        assert_eq!(format_hhmm(3599), "00:59");
        assert_eq!(format_hhmm(12544), "03:29");
        assert_eq!(format_hhmm(100 * 3600 + 60), "100:01");
    }

    #[test]
    fn displays_use_status_words() {
        let mut s = status(85.0, false);
        assert_eq!(time_to_threshold_display(&s), STATUS_REACHED);
        assert_eq!(time_to_full_display(&s), STATUS_UNAVAILABLE);

        s.soc = 100.0;
        assert_eq!(time_to_full_display(&s), STATUS_FULL);

        s.soc = 40.0;
        s.durations = Durations {
            elapsed_seconds: 60,
            seconds_to_threshold: Some(7200),
            seconds_to_full: None,
        };
        assert_eq!(time_to_threshold_display(&s), "02:00");
    }

    #[test]
    fn icon_bands() {
        assert_eq!(battery_icon(None, false, false), "mdi:battery-unknown");
        assert_eq!(battery_icon(Some(97.0), false, false), "mdi:battery");
        assert_eq!(battery_icon(Some(97.0), true, false), "mdi:battery-charging");
        assert_eq!(battery_icon(Some(88.0), false, false), "mdi:battery-90");
        assert_eq!(battery_icon(Some(50.0), true, false), "mdi:battery-charging-50");
        assert_eq!(battery_icon(Some(10.0), true, true), "mdi:battery-plus-10");
        assert_eq!(battery_icon(Some(3.0), false, false), "mdi:battery-outline");
        assert_eq!(
            battery_icon(Some(3.0), true, false),
            "mdi:battery-charging-alert-variant-outline"
        );
    }

    #[test]
    fn readings_round_and_schedule() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut s = status(42.04, true);
        s.total_energy_kwh = 1.23456;
        s.current_power_kw = 0.9;
        s.session_start_time = Some(now);
        s.durations = Durations {
            elapsed_seconds: 0,
            seconds_to_threshold: Some(3600),
            seconds_to_full: Some(7200),
        };

        let readings = SensorReadings::from_status(&s, &chrono_tz::Europe::Paris, now);
        assert_eq!(readings.soc, 42.0);
        assert_eq!(readings.total_energy_kwh, 1.235);
        assert_eq!(readings.time_to_threshold, "01:00");
        assert_eq!(
            readings.time_at_threshold.as_deref(),
            Some("2025-06-01T11:00:00+02:00")
        );
        assert_eq!(
            readings.session_start_time.as_deref(),
            Some("2025-06-01T10:00:00+02:00")
        );
        assert_eq!(readings.icon, "mdi:battery-charging-40");
    }

    #[test]
    fn unrepresentable_completion_time_is_absent() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut s = status(0.0, true);
        s.durations = Durations {
            elapsed_seconds: 0,
            seconds_to_threshold: Some(11_289_600_000_000_000),
            seconds_to_full: Some(u64::MAX),
        };

        let readings = SensorReadings::from_status(&s, &Utc, now);
        assert!(readings.time_at_threshold.is_none());
        assert!(readings.time_at_full.is_none());
        assert_eq!(readings.time_to_threshold, format_hhmm(11_289_600_000_000_000));
        assert_eq!(readings.time_to_full, format_hhmm(u64::MAX));
    }
}
