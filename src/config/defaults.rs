use super::*;

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            file: "/data/charge_tracker_state.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: String::new(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "BMW CE-02".to_string(),
            battery_capacity_kwh: 3.92,
            phase_threshold_pct: 80.0,
            tick_interval_seconds: 60,
            initial_soc: 50.0,
            session_time_policy: None,
            power_model: PowerModel::ce02_fixed_profile(),
            power_source: PowerSourceConfig::default(),
            persistence: PersistenceConfig::default(),
            timezone: "UTC".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}
