use charge_tracker::estimator::{ChargeEstimator, EstimatorConfig};
use charge_tracker::persistence::{PersistedSnapshot, StateStore};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn fixed() -> ChargeEstimator {
    ChargeEstimator::new(EstimatorConfig::fixed_profile(3.92, 80.0, 0.9, 0.517)).unwrap()
}

#[test]
fn attributes_roundtrip_through_host_storage() {
    let mut est = fixed();
    est.start_session(t0());
    est.tick(t0() + Duration::minutes(20));

    let attributes = est.snapshot().to_attributes();
    assert_eq!(attributes.get("is_charging"), Some(&Value::Bool(true)));
    assert_eq!(
        attributes.get("session_start_time").and_then(Value::as_str),
        Some("2025-06-01T08:00:00+00:00")
    );

    let restored_snapshot = PersistedSnapshot::from_attributes(&attributes);
    let mut restored = fixed();
    restored.restore(&restored_snapshot, t0() + Duration::minutes(25));
    assert!(restored.is_charging());
    assert_eq!(restored.soc(), est.soc());
    assert_eq!(restored.total_energy_kwh(), est.total_energy_kwh());
    assert_eq!(restored.state().session_start_time, Some(t0()));
}

#[test]
fn restart_gap_is_integrated_on_next_tick() {
    let mut cfg = EstimatorConfig::fixed_profile(3.92, 80.0, 0.9, 0.517);
    cfg.initial_soc = 0.0;
    let mut est = ChargeEstimator::new(cfg.clone()).unwrap();
    est.start_session(t0());
    est.tick(t0() + Duration::minutes(30));
    let snapshot = est.snapshot();

    // Host was down for 30 minutes
    let mut restored = ChargeEstimator::new(cfg).unwrap();
    restored.restore(&snapshot, t0() + Duration::hours(1));
    restored.tick(t0() + Duration::hours(1));
    assert!((restored.total_energy_kwh() - 0.9).abs() < 1e-9);
}

#[test]
fn malformed_watermark_falls_back_to_now() {
    let attributes = match json!({
        "soc": 60.0,
        "total_energy_kwh": "1.0",
        "is_charging": true,
        "soc_at_session_start": 25.0,
        "session_start_time": "2025-06-01T08:00:00+00:00",
        "last_integration_time": "garbage"
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };

    let now = t0() + Duration::hours(2);
    let mut est = fixed();
    est.restore(&PersistedSnapshot::from_attributes(&attributes), now);
    assert_eq!(est.state().session_start_time, Some(t0()));
    assert_eq!(est.state().last_integration_time, Some(now));
    assert_eq!(est.state().soc_at_session_start, 25.0);
    assert_eq!(est.status().soc_at_session_start, Some(25.0));

    // The session before the lost watermark is already in the persisted SoC
    est.tick(now);
    assert_eq!(est.soc(), 60.0);
    assert_eq!(est.total_energy_kwh(), 1.0);
}

#[test]
fn state_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));

    let mut est = fixed();
    est.set_soc(64.0, t0()).unwrap();
    store.save(&est.snapshot()).unwrap();

    let snapshot = store.load().unwrap().unwrap();
    let mut restored = fixed();
    restored.restore(&snapshot, t0());
    assert_eq!(restored.soc(), 64.0);
    assert!(!restored.is_charging());
}

#[test]
fn legacy_state_file_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{
            "soc": "55.5",
            "persisted_is_charging_flag": true,
            "persisted_soc_at_charge_start_val": 40.0,
            "persisted_charge_start_time_val": "2025-06-01T08:00:00+00:00"
        }"#,
    )
    .unwrap();

    let snapshot = StateStore::new(&path).load().unwrap().unwrap();
    let now = t0() + Duration::minutes(1);
    let mut est = fixed();
    est.restore(&snapshot, now);
    assert!(est.is_charging());
    assert_eq!(est.soc(), 55.5);
    assert_eq!(est.state().session_start_time, Some(t0()));
    assert_eq!(est.state().last_integration_time, Some(now));

    est.tick(now);
    assert_eq!(est.soc(), 55.5);
}
