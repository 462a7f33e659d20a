//! Charge estimation state machine
//!
//! [`ChargeEstimator`] owns all mutable charging state for one device. It
//! detects session start/stop (automatically from measured power, or through
//! explicit commands with the fixed profile), integrates power over elapsed
//! wall-clock time into energy and SoC, derives remaining-time estimates, and
//! notifies observers after every change.
//!
//! All calls are expected to be serialized by the host (one event loop, or a
//! mutex around the estimator). Every time-dependent operation takes the
//! host's `now` so late or missed ticks only widen the next integration step.

use crate::error::{Result, TrackerError};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::observers::{Observers, Subscription};
use crate::power::{PowerModel, PowerReading, PowerSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

mod durations;
mod integration;
mod restore;
mod types;

pub use durations::{
    MEASURED_ESTIMATION_FLOOR_KW, seconds_to_full, seconds_to_threshold,
};
pub use types::{ChargeStatus, Durations, EstimatorConfig, EstimatorState, SessionTimePolicy};

use integration::IntegrationStep;

/// State of charge estimator for a single device
pub struct ChargeEstimator {
    config: EstimatorConfig,
    state: EstimatorState,
    durations: Durations,
    power_source: Option<Arc<dyn PowerSource>>,
    observers: Observers,
    status_tx: watch::Sender<Arc<ChargeStatus>>,
    logger: StructuredLogger,
}

impl ChargeEstimator {
    /// Create an estimator; fails fast on invalid configuration
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;

        let logger = get_logger_with_context(
            LogContext::new("estimator").with_device(&config.device_name),
        );

        let state = EstimatorState {
            soc: config.initial_soc,
            ..Default::default()
        };

        let mut estimator = Self {
            status_tx: watch::channel(Arc::new(ChargeStatus::default())).0,
            config,
            state,
            durations: Durations::default(),
            power_source: None,
            observers: Observers::new(),
            logger,
        };
        estimator.refresh(Utc::now());

        estimator.logger.info(&format!(
            "Estimator initialized ({}), capacity {:.2} kWh, phase threshold {:.1}%",
            estimator.mode_name(),
            estimator.config.battery_capacity_kwh,
            estimator.config.phase_threshold_pct
        ));
        Ok(estimator)
    }

    /// Attach the external power sensor used in measured mode
    pub fn with_power_source(mut self, source: Arc<dyn PowerSource>) -> Self {
        self.logger
            .info(&format!("Using power source '{}'", source.describe()));
        self.power_source = Some(source);
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn soc(&self) -> f64 {
        self.state.soc
    }

    pub fn is_charging(&self) -> bool {
        self.state.is_charging
    }

    pub fn total_energy_kwh(&self) -> f64 {
        self.state.total_energy_kwh
    }

    pub fn last_known_power_kw(&self) -> f64 {
        self.state.last_known_power_kw
    }

    pub fn durations(&self) -> Durations {
        self.durations
    }

    /// Power currently credited to the battery (0 when idle)
    pub fn current_power_kw(&self) -> f64 {
        if !self.state.is_charging {
            return 0.0;
        }
        self.config
            .power_model
            .phase_power_kw(self.state.soc, self.config.phase_threshold_pct)
            .unwrap_or(self.state.last_known_power_kw)
    }

    /// Latest published status
    pub fn status(&self) -> Arc<ChargeStatus> {
        self.status_tx.borrow().clone()
    }

    /// Receiver that always holds the latest published status
    pub fn watch_status(&self) -> watch::Receiver<Arc<ChargeStatus>> {
        self.status_tx.subscribe()
    }

    /// Register a change observer; it is invoked once immediately
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    /// Detach every observer (host teardown or reconfiguration)
    pub fn detach_observers(&self) {
        self.observers.clear();
        self.logger.debug("All observers detached");
    }

    /// Periodic heartbeat
    pub fn tick(&mut self, now: DateTime<Utc>) {
        match self.config.power_model {
            PowerModel::MeasuredSensor {
                loss_factor,
                min_charging_power_w,
            } => self.tick_measured(now, loss_factor, min_charging_power_w),
            PowerModel::FixedProfile { .. } => {
                if self.state.is_charging {
                    self.integrate(IntegrationStep::regular(now));
                }
            }
        }

        self.refresh(now);
        self.observers.notify();
    }

    /// Start a charging session (no-op when one is active)
    pub fn start_session(&mut self, now: DateTime<Utc>) {
        if self.state.is_charging {
            return;
        }
        self.begin_session(now, "started manually");
        self.refresh(now);
        self.observers.notify();
    }

    /// Stop the active session after a final integration step (no-op when idle)
    pub fn stop_session(&mut self, now: DateTime<Utc>) {
        if !self.state.is_charging {
            return;
        }
        let power_override = self
            .config
            .power_model
            .is_measured()
            .then_some(self.state.last_known_power_kw);
        self.end_session(now, power_override, "stopped manually");
        self.refresh(now);
        self.observers.notify();
    }

    /// Manually set the SoC, re-basing an active session on the new value
    pub fn set_soc(&mut self, value: f64, now: DateTime<Utc>) -> Result<()> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            self.logger
                .warn(&format!("Invalid SoC value for manual set: {}", value));
            return Err(TrackerError::invalid_input("soc", value));
        }

        self.session_logger().info(&format!(
            "SoC manually set from {:.1}% to {:.1}%",
            self.state.soc, value
        ));
        self.state.soc = value;

        if self.state.is_charging {
            // The jump is not charging energy: move the watermark past it
            self.state.last_integration_time = Some(
                self.state
                    .last_integration_time
                    .map_or(now, |last| last.max(now)),
            );
            self.state.soc_at_session_start = value;
            self.session_logger()
                .debug("SoC changed during active session, watermark re-based");
        }

        self.refresh(now);
        self.observers.notify();
        Ok(())
    }

    fn tick_measured(&mut self, now: DateTime<Utc>, loss_factor: f64, min_charging_power_w: f64) {
        let adjusted_w = self.read_adjusted_power_w(loss_factor);
        let significant = adjusted_w > min_charging_power_w;

        if significant && !self.state.is_charging {
            self.begin_session(
                now,
                &format!(
                    "detected (power: {:.1}W > {:.1}W)",
                    adjusted_w, min_charging_power_w
                ),
            );
        } else if !significant && self.state.is_charging {
            let last_known = self.state.last_known_power_kw;
            self.end_session(
                now,
                Some(last_known),
                &format!(
                    "stopped (power: {:.1}W <= {:.1}W)",
                    adjusted_w, min_charging_power_w
                ),
            );
        }

        if self.state.is_charging {
            self.integrate(IntegrationStep::regular(now));
        }
    }

    /// Read the sensor and apply the loss factor; unusable readings count as 0 W
    fn read_adjusted_power_w(&mut self, loss_factor: f64) -> f64 {
        let reading = match &self.power_source {
            Some(source) => source.read(),
            None => {
                self.logger.debug("Power source not configured");
                PowerReading::Unavailable
            }
        };

        match reading {
            PowerReading::Watts(raw_w) => {
                // A charger never feeds power back; treat negative glitches as 0 W
                let adjusted_w = (raw_w * loss_factor).max(0.0);
                self.state.last_known_power_kw = adjusted_w / 1000.0;
                adjusted_w
            }
            PowerReading::Unavailable => {
                let err = TrackerError::sensor_unavailable(
                    self.power_source
                        .as_ref()
                        .map_or_else(|| "not configured".to_string(), |s| s.describe()),
                );
                self.logger.debug(&format!("{}; treating as 0 W", err));
                0.0
            }
        }
    }

    fn begin_session(&mut self, now: DateTime<Utc>, reason: &str) {
        self.state.is_charging = true;
        self.state.soc_at_session_start = self.state.soc;
        self.state.session_start_time = Some(now);
        self.state.last_integration_time = Some(now);
        self.state.session_id = Some(uuid::Uuid::new_v4().to_string());

        self.session_logger().info(&format!(
            "Charging {}. SoC at start: {:.1}%",
            reason, self.state.soc
        ));
    }

    fn end_session(&mut self, now: DateTime<Utc>, power_override_kw: Option<f64>, reason: &str) {
        self.integrate(IntegrationStep::final_step(now, power_override_kw));
        self.session_logger().info(&format!(
            "Charging {}. SoC: {:.1}%, energy total: {:.3} kWh",
            reason, self.state.soc, self.state.total_energy_kwh
        ));

        self.state.is_charging = false;
        self.state.session_id = None;
        if self.config.session_time_policy == SessionTimePolicy::Clear {
            self.state.session_start_time = None;
        }
    }

    /// Recompute derived metrics and publish the status
    fn refresh(&mut self, now: DateTime<Utc>) {
        self.durations = self.derive_durations(now);
        let status = self.build_status(now);
        self.status_tx.send_replace(Arc::new(status));
    }

    fn build_status(&self, now: DateTime<Utc>) -> ChargeStatus {
        let min_charging_power_w = match self.config.power_model {
            PowerModel::MeasuredSensor {
                min_charging_power_w,
                ..
            } => Some(min_charging_power_w),
            PowerModel::FixedProfile { .. } => None,
        };

        ChargeStatus {
            timestamp: now,
            device_name: self.config.device_name.clone(),
            soc: self.state.soc,
            is_charging: self.state.is_charging,
            soc_at_session_start: self
                .state
                .is_charging
                .then_some(self.state.soc_at_session_start),
            session_start_time: self.state.session_start_time,
            session_id: self.state.session_id.clone(),
            total_energy_kwh: self.state.total_energy_kwh,
            current_power_kw: self.current_power_kw(),
            last_known_power_kw: self.state.last_known_power_kw,
            durations: self.durations,
            battery_capacity_kwh: self.config.battery_capacity_kwh,
            phase_threshold_pct: self.config.phase_threshold_pct,
            min_charging_power_w,
        }
    }

    fn session_logger(&self) -> StructuredLogger {
        self.logger.for_session(self.state.session_id.as_deref())
    }

    fn mode_name(&self) -> &'static str {
        match self.config.power_model {
            PowerModel::FixedProfile { .. } => "fixed profile",
            PowerModel::MeasuredSensor { .. } => "measured sensor",
        }
    }
}
