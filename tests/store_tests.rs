use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDate, TimeZone, Utc};

use fuelcast::accuracy::LoggedAccuracy;
use fuelcast::model::accuracy::AccuracyRecord;
use fuelcast::model::fuel::FuelType;
use fuelcast::store::{
    append_accuracy_log, load_accuracy_log, load_weight_snapshot_from_path,
    persist_weight_snapshot_to_path,
};
use fuelcast::weights::WeightSet;

fn temp_path(test_name: &str, ext: &str) -> std::path::PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("fuelcast-{}-{}.{}", test_name, ts, ext))
}

fn entry(
    region: &str,
    fuel: FuelType,
    day: u32,
    predicted: f64,
    realized: f64,
    contributions: &[(&str, f64)],
) -> LoggedAccuracy {
    let date = NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
    LoggedAccuracy {
        record: AccuracyRecord::new(region, fuel, date, "run-1", day as usize, predicted, realized),
        reference_price: realized - 3.0,
        contributions: contributions
            .iter()
            .map(|(id, c)| (id.to_string(), *c))
            .collect(),
    }
}

#[test]
/// Verifies the accuracy log is append-only and reloads rows, reference
/// prices and factor contributions in insertion order.
fn accuracy_log_survives_reopen() {
    let path = temp_path("accuracy-log", "sqlite");
    let first = vec![
        entry(
            "seoul",
            FuelType::Gasoline,
            2,
            1712.0,
            1705.0,
            &[("dubai_crude", 0.004), ("usd_krw", -0.001)],
        ),
        entry("busan", FuelType::Diesel, 2, 1590.0, 1601.0, &[("dubai_crude", -0.002)]),
    ];
    let second = vec![entry("seoul", FuelType::Gasoline, 3, 1715.0, 1709.0, &[])];

    assert_eq!(append_accuracy_log(&path, &first).expect("append should succeed"), 2);
    assert_eq!(append_accuracy_log(&path, &second).expect("append should succeed"), 1);

    let all = load_accuracy_log(&path, None).expect("load should succeed");
    assert_eq!(all.len(), 3);
    assert_eq!(all[0], first[0]);
    assert_eq!(all[2], second[0]);
    assert!((all[0].contributions["usd_krw"] + 0.001).abs() < 1e-15);
    assert!(all[2].contributions.is_empty());

    let diesel = load_accuracy_log(&path, Some(FuelType::Diesel)).expect("load should succeed");
    assert_eq!(diesel.len(), 1);
    assert_eq!(diesel[0].record.region, "busan");
    assert!(diesel[0].record.pct_error < 0.0);
    assert_eq!(diesel[0].contributions.len(), 1);
    assert!((diesel[0].reference_price - 1598.0).abs() < 1e-12);

    let _ = std::fs::remove_file(&path);
}

#[test]
/// Verifies an empty database yields no entries rather than an error.
fn empty_accuracy_log_loads_empty() {
    let path = temp_path("accuracy-empty", "sqlite");
    let loaded = load_accuracy_log(&path, Some(FuelType::Gasoline)).expect("load should succeed");
    assert!(loaded.is_empty());
    let _ = std::fs::remove_file(&path);
}

#[test]
/// Verifies weight snapshot persistence round-trip, including nested directories.
fn weight_snapshot_round_trip() {
    let dir = temp_path("weights-dir", "d");
    let path = dir.join("nested").join("weights.json");
    let set = WeightSet {
        generation: 12,
        generated_at: Utc.with_ymd_and_hms(2025, 6, 3, 9, 30, 0).unwrap(),
        weights: BTreeMap::from([("dubai_crude".to_string(), 0.7), ("usd_krw".to_string(), 0.3)]),
    };

    persist_weight_snapshot_to_path(&path, &set).expect("persist should succeed");
    let loaded = load_weight_snapshot_from_path(&path)
        .expect("load should succeed")
        .expect("snapshot should exist");
    assert_eq!(loaded, set);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_weight_snapshot_is_none() {
    let path = temp_path("weights-missing", "json");
    assert!(load_weight_snapshot_from_path(&path).unwrap().is_none());
}

#[test]
fn corrupt_weight_snapshot_is_an_error() {
    let path = temp_path("weights-corrupt", "json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = load_weight_snapshot_from_path(&path).unwrap_err();
    assert!(matches!(err, fuelcast::error::ForecastError::Json(_)));
    let _ = std::fs::remove_file(&path);
}
