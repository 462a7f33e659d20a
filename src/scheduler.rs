//! Periodic heartbeat driving [`ChargeEstimator::tick`]

use crate::estimator::ChargeEstimator;
use crate::logging::{StructuredLogger, get_logger};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Background task ticking an estimator at a fixed interval
///
/// The first tick runs immediately. Late ticks are not replayed: the next
/// tick integrates the whole elapsed interval instead.
pub struct Ticker {
    handle: JoinHandle<()>,
    ticks: Arc<AtomicU64>,
    logger: StructuredLogger,
}

impl Ticker {
    /// Start ticking; `on_tick` runs after every tick with the estimator locked
    pub fn spawn<F>(estimator: Arc<Mutex<ChargeEstimator>>, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(&ChargeEstimator) + Send + 'static,
    {
        let logger = get_logger("scheduler");
        let ticks = Arc::new(AtomicU64::new(0));

        let task_ticks = Arc::clone(&ticks);
        let task_logger = logger.clone();
        let handle = tokio::spawn(async move {
            let mut heartbeat = interval(period);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                heartbeat.tick().await;
                let mut est = estimator.lock().await;
                est.tick(Utc::now());
                let count = task_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                on_tick(&est);
                task_logger.trace(&format!("Tick {} done, SoC {:.2}%", count, est.soc()));
            }
        });

        logger.info(&format!("Ticking every {}s", period.as_secs_f64()));
        Self {
            handle,
            ticks,
            logger,
        }
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop ticking; an in-flight tick is abandoned at its next await point
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            self.logger.info("Ticker cancelled");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimatorConfig;

    #[tokio::test]
    async fn first_tick_runs_immediately() {
        let est = ChargeEstimator::new(EstimatorConfig::fixed_profile(3.92, 80.0, 0.9, 0.517))
            .unwrap();
        let est = Arc::new(Mutex::new(est));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let ticker = Ticker::spawn(Arc::clone(&est), Duration::from_secs(3600), move |e| {
            let _ = tx.send(e.soc());
        });
        let soc = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(soc, 50.0);
        assert_eq!(ticker.ticks(), 1);

        ticker.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!ticker.is_running());
    }
}
