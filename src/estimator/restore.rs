use super::{ChargeEstimator, SessionTimePolicy};
use crate::persistence::{PersistedSnapshot, format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};

impl ChargeEstimator {
    /// Export the state that must survive a restart
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            soc: Some(self.state.soc),
            total_energy_kwh: Some(self.state.total_energy_kwh),
            is_charging: self.state.is_charging,
            soc_at_session_start: self
                .state
                .is_charging
                .then_some(self.state.soc_at_session_start),
            session_start_time: self.state.session_start_time.map(format_timestamp),
            last_integration_time: self.state.last_integration_time.map(format_timestamp),
        }
    }

    /// Reinstate state saved by [`ChargeEstimator::snapshot`]
    ///
    /// Malformed timestamps never abort the restore: a missing or unreadable
    /// session start or watermark falls back to `now`. The persisted SoC
    /// already covers everything up to the lost watermark, so nothing before
    /// `now` is integrated again. With a valid watermark the gap between the
    /// snapshot and `now` is integrated by the next tick.
    pub fn restore(&mut self, snapshot: &PersistedSnapshot, now: DateTime<Utc>) {
        if let Some(soc) = snapshot.soc {
            if soc.is_finite() {
                self.state.soc = soc.clamp(0.0, 100.0);
            }
        }

        self.state.total_energy_kwh = snapshot
            .total_energy_kwh
            .filter(|e| e.is_finite() && *e >= 0.0)
            .unwrap_or(0.0);

        if snapshot.is_charging {
            let start = self
                .restored_time("session_start_time", snapshot.session_start_time.as_deref())
                .unwrap_or(now);
            let watermark = self
                .restored_time("last_integration_time", snapshot.last_integration_time.as_deref())
                .unwrap_or(now);

            self.state.is_charging = true;
            self.state.soc_at_session_start = snapshot
                .soc_at_session_start
                .filter(|s| s.is_finite())
                .map_or(self.state.soc, |s| s.clamp(0.0, 100.0));
            self.state.session_start_time = Some(start);
            self.state.last_integration_time = Some(watermark);
            self.state.session_id = Some(uuid::Uuid::new_v4().to_string());

            self.session_logger().info(&format!(
                "Restored active session started {} (SoC {:.1}%, accounted until {})",
                start.to_rfc3339(),
                self.state.soc,
                watermark.to_rfc3339()
            ));
        } else {
            self.state.is_charging = false;
            self.state.session_id = None;
            self.state.last_integration_time = None;
            let start =
                self.restored_time("session_start_time", snapshot.session_start_time.as_deref());
            self.state.session_start_time = match self.config.session_time_policy {
                SessionTimePolicy::Retain => start,
                SessionTimePolicy::Clear => None,
            };
            self.logger.info(&format!(
                "Restored idle state (SoC {:.1}%, energy {:.3} kWh)",
                self.state.soc, self.state.total_energy_kwh
            ));
        }

        self.refresh(now);
        self.observers.notify();
    }

    fn restored_time(&self, field: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
        let raw = raw?;
        match parse_timestamp(raw) {
            Ok(ts) => Some(ts),
            Err(e) => {
                self.logger
                    .warn(&format!("Ignoring persisted {} '{}': {}", field, raw, e));
                None
            }
        }
    }
}
