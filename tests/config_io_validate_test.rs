use charge_tracker::config::Config;
use charge_tracker::estimator::SessionTimePolicy;
use charge_tracker::power::PowerModel;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.device_name = "Garage CE-02".to_string();
    cfg.power_model = PowerModel::ce02_measured();
    cfg.power_source.file = Some("/run/plug_power".to_string());
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.device_name, "Garage CE-02");
    assert_eq!(loaded.power_model, PowerModel::ce02_measured());
    assert_eq!(loaded.power_source.file.as_deref(), Some("/run/plug_power"));
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert_eq!(loaded.session_time_policy(), SessionTimePolicy::Clear);
    assert!(loaded.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    // Empty device name
    cfg.device_name.clear();
    assert!(cfg.validate().is_err());

    // Capacity must be positive
    cfg = Config::default();
    cfg.battery_capacity_kwh = -1.0;
    assert!(cfg.validate().is_err());

    // Initial SoC out of range
    cfg = Config::default();
    cfg.initial_soc = 150.0;
    assert!(cfg.validate().is_err());

    // Fixed profile powers must be positive
    cfg = Config::default();
    cfg.power_model = PowerModel::FixedProfile {
        phase1_power_kw: 0.9,
        phase2_power_kw: 0.0,
    };
    assert!(cfg.validate().is_err());

    // Loss factor outside (0, 1]
    cfg = Config::default();
    cfg.power_model = PowerModel::MeasuredSensor {
        loss_factor: 1.5,
        min_charging_power_w: 10.0,
    };
    cfg.power_source.file = Some("/run/plug_power".to_string());
    assert!(cfg.validate().is_err());

    // Measured mode needs a power source
    cfg = Config::default();
    cfg.power_model = PowerModel::ce02_measured();
    assert!(cfg.validate().is_err());

    // Empty state file path
    cfg = Config::default();
    cfg.persistence.file = "  ".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn tagged_power_model_from_yaml() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"power_model:\n  type: fixed_profile\n  phase1_power_kw: 1.0\n  phase2_power_kw: 0.5\ntimezone: Europe/Paris\n",
    )
    .unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(
        cfg.power_model,
        PowerModel::FixedProfile {
            phase1_power_kw: 1.0,
            phase2_power_kw: 0.5
        }
    );
    assert_eq!(cfg.timezone().unwrap(), chrono_tz::Europe::Paris);
    let est = cfg.estimator_config();
    assert_eq!(est.session_time_policy, SessionTimePolicy::Retain);
    assert!((est.battery_capacity_kwh - 3.92).abs() < f64::EPSILON);
}
