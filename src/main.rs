use anyhow::{Context, Result};
use charge_tracker::config::Config;
use charge_tracker::estimator::ChargeEstimator;
use charge_tracker::logging::{get_logger, init_logging};
use charge_tracker::persistence::StateStore;
use charge_tracker::power::{FilePowerSource, PowerSource};
use charge_tracker::scheduler::Ticker;
use charge_tracker::sensors::SensorReadings;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

/// Interval at which the measured-power file is re-read
const POWER_FILE_POLL: Duration = Duration::from_secs(5);

const AFTER_HELP: &str = "\
With the fixed_profile power model the runner only keeps time: sessions are
started and stopped, and the SoC is corrected, by a host calling
start_session, stop_session and set_soc on the charge_tracker library.
With measured_sensor, sessions follow the power file configured under
power_source.file.";

/// State of charge estimator for the BMW CE-02
#[derive(Debug, Parser)]
#[command(name = "charge-tracker", version = env!("APP_VERSION"), after_help = AFTER_HELP)]
struct Args {
    /// Configuration file (default: the first of the standard locations found)
    #[arg(short, long, env = "CHARGE_TRACKER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = match args.config {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let logger = get_logger("main");
    logger.info(&format!(
        "Charge Tracker {} starting for {}",
        env!("APP_VERSION"),
        config.device_name
    ));

    let tz = config.timezone()?;
    let mut estimator = ChargeEstimator::new(config.estimator_config())?;
    let mut power_poller = None;
    if !config.power_model.is_measured() {
        logger.info(
            "Fixed profile: sessions and SoC corrections come from the library API, \
             this runner only ticks and persists",
        );
    } else if let Some(file) = config.power_source.file.as_deref() {
        let source = Arc::new(FilePowerSource::new(file));
        source.refresh().await;
        let shared: Arc<dyn PowerSource> = source.clone();
        estimator = estimator.with_power_source(shared);
        power_poller = Some(source.spawn_polling(POWER_FILE_POLL));
    }

    let store = Arc::new(StateStore::new(&config.persistence.file));
    match store.load() {
        Ok(Some(snapshot)) => estimator.restore(&snapshot, Utc::now()),
        Ok(None) => {}
        Err(e) => logger.warn(&format!("Ignoring unreadable state file: {}", e)),
    }

    let status_rx = estimator.watch_status();
    let status_logger = get_logger("status");
    let _status_subscription = estimator.subscribe(move || {
        let readings = SensorReadings::from_status(&status_rx.borrow(), &tz, Utc::now());
        status_logger.info(&format!(
            "SoC {:.1}% | charging: {} | power {:.3} kW | energy {:.3} kWh | to threshold {} | to full {}",
            readings.soc,
            readings.is_charging,
            readings.current_power_kw,
            readings.total_energy_kwh,
            readings.time_to_threshold,
            readings.time_to_full
        ));
        Ok(())
    });

    let estimator = Arc::new(Mutex::new(estimator));
    let tick_store = Arc::clone(&store);
    let tick_logger = logger.clone();
    let ticker = Ticker::spawn(
        Arc::clone(&estimator),
        Duration::from_secs(config.tick_interval_seconds),
        move |est| {
            if let Err(e) = tick_store.save(&est.snapshot()) {
                tick_logger.error(&format!("Failed to save state: {}", e));
            }
        },
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    logger.info("Shutdown signal received");

    ticker.cancel();
    if let Some(poller) = power_poller {
        poller.abort();
    }
    let est = estimator.lock().await;
    est.detach_observers();
    store.save(&est.snapshot())?;
    logger.info(&format!(
        "State saved to {}, shutdown complete",
        store.path().display()
    ));
    Ok(())
}
