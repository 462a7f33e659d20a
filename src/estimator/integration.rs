use super::ChargeEstimator;
use crate::power::PowerModel;
use chrono::{DateTime, Utc};

/// One request to account for energy up to `now`
#[derive(Debug, Clone, Copy)]
pub(super) struct IntegrationStep {
    pub now: DateTime<Utc>,
    /// Last step of a session: runs even for tiny intervals
    pub final_step: bool,
    /// Power to apply instead of the model's current power (kW)
    pub power_override_kw: Option<f64>,
}

impl IntegrationStep {
    pub fn regular(now: DateTime<Utc>) -> Self {
        Self {
            now,
            final_step: false,
            power_override_kw: None,
        }
    }

    pub fn final_step(now: DateTime<Utc>, power_override_kw: Option<f64>) -> Self {
        Self {
            now,
            final_step: true,
            power_override_kw,
        }
    }
}

impl ChargeEstimator {
    /// Convert power over the elapsed interval into energy and SoC
    ///
    /// The phase is chosen from the SoC at the start of the interval; a step
    /// that crosses the threshold is not split.
    pub(super) fn integrate(&mut self, step: IntegrationStep) {
        if !self.state.is_charging && !step.final_step {
            return;
        }

        let logger = self.session_logger();

        let since = match self.state.last_integration_time {
            Some(t) => t,
            None if step.final_step => match self.state.session_start_time {
                Some(t) => t,
                None => {
                    logger.warn("No integration watermark or session start, skipping final step");
                    return;
                }
            },
            None => {
                logger.warn("No integration watermark, skipping step");
                return;
            }
        };

        let dt_s = (step.now - since).num_milliseconds() as f64 / 1000.0;
        if dt_s < 0.0 {
            logger.warn(&format!(
                "Clock went backwards by {:.1}s, keeping watermark at {}",
                -dt_s,
                since.to_rfc3339()
            ));
            return;
        }
        if dt_s <= self.config.power_model.min_integration_interval() && !step.final_step {
            return;
        }

        if self.state.soc >= 100.0 {
            logger.debug("Battery full, skipping integration");
            self.state.last_integration_time = Some(step.now);
            return;
        }

        let power_kw = step.power_override_kw.unwrap_or_else(|| {
            self.config
                .power_model
                .phase_power_kw(self.state.soc, self.config.phase_threshold_pct)
                .unwrap_or(self.state.last_known_power_kw)
        });

        if let PowerModel::MeasuredSensor {
            min_charging_power_w,
            ..
        } = self.config.power_model
        {
            if !step.final_step && power_kw * 1000.0 < min_charging_power_w / 2.0 {
                logger.debug(&format!(
                    "Power {:.1}W too low to integrate over {:.1}s",
                    power_kw * 1000.0,
                    dt_s
                ));
                self.state.last_integration_time = Some(step.now);
                return;
            }
        }

        let energy_kwh = power_kw * dt_s / 3600.0;
        if energy_kwh > 0.0 {
            self.state.total_energy_kwh += energy_kwh;
        }

        let previous = self.state.soc;
        let delta_pct = energy_kwh / self.config.battery_capacity_kwh * 100.0;
        self.state.soc = (previous + delta_pct).clamp(0.0, 100.0);
        self.state.last_integration_time = Some(step.now);

        logger.debug(&format!(
            "Integrated {:.1}s at {:.3} kW: +{:.4} kWh, SoC {:.2}% -> {:.2}%",
            dt_s, power_kw, energy_kwh, previous, self.state.soc
        ));
    }
}
