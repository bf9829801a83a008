use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, NaiveDate};
use tokio::sync::watch;

use fuelcast::config::Config;
use fuelcast::engine::ForecastEngine;
use fuelcast::error::ForecastError;
use fuelcast::factor::{
    ArHoltHybridConfig, ConstantTrendConfig, FactorFailure, FactorForecaster, ForecastContext,
    ForecastMethod, ForecasterSpec, HistoryWindow, Projection,
};
use fuelcast::feed::{synthetic_series, InMemoryFeed, MarketSnapshot};
use fuelcast::model::factor::{Factor, FactorCategory};
use fuelcast::model::forecast::ForecastPath;
use fuelcast::model::fuel::FuelType;
use fuelcast::model::region::{RegionProfile, NATIONAL_REGION_CODE};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn flat_region(code: &str) -> RegionProfile {
    RegionProfile {
        code: code.to_string(),
        name: code.to_string(),
        premium_coefficient: 0.0,
        volatility_factor: 1.0,
        competition_index: 1.0,
        infrastructure_score: 1.0,
        aggregate_weight: 1.0,
        neighbors: Vec::new(),
    }
}

fn trend_factor(id: &str, weight: f64, daily_trend: f64) -> Factor {
    Factor {
        id: id.to_string(),
        category: FactorCategory::International,
        static_weight: weight,
        pass_through: 1.0,
        lookback_days: 30,
        active: true,
        forecaster: ForecasterSpec::ConstantTrend(ConstantTrendConfig {
            daily_trend,
            daily_volatility: 0.0,
        }),
    }
}

fn scenario_config(factors: Vec<Factor>, daily_limit: Option<f64>) -> Config {
    let mut config = Config::default();
    config.regions = vec![flat_region("metro")];
    config.factors = factors;
    config.constraints.daily_limit = daily_limit;
    config
}

fn empty_engine(config: Config) -> ForecastEngine {
    ForecastEngine::new(config, Arc::new(InMemoryFeed::new())).expect("engine should build")
}

fn synthetic_feed() -> InMemoryFeed {
    let specs: &[(&str, f64, f64, f64)] = &[
        ("dubai_crude", 78.0, 0.0004, 0.012),
        ("singapore_product", 92.0, 0.0003, 0.010),
        ("refinery_margin", 9.5, -0.0002, 0.020),
        ("usd_krw", 1365.0, 0.0001, 0.003),
        ("fuel_tax", 820.0, 0.0, 0.0),
        ("import_cost", 640.0, 0.0003, 0.008),
        ("inventory", 14_500.0, -0.0001, 0.015),
        ("consumption", 7_200.0, 0.0001, 0.030),
        ("regional_consumption", 430.0, 0.0001, 0.025),
        ("cpi", 114.0, 0.0001, 0.0005),
        ("land_price", 102.0, 0.0002, 0.0),
        ("vehicle_fleet", 25_900.0, 0.00005, 0.0),
        ("retail_margin", 115.0, 0.0, 0.040),
        ("logistics_cost", 48.0, 0.0002, 0.005),
    ];
    let mut feed = InMemoryFeed::new();
    for (id, level, trend, wave) in specs {
        feed.insert(HistoryWindow::from_values(
            *id,
            as_of(),
            &synthetic_series(*level, *trend, *wave, 400),
        ));
    }
    feed
}

fn catalogue_engine() -> ForecastEngine {
    let mut config = Config::default();
    config.engine.forecaster_timeout_ms = 30_000;
    ForecastEngine::new(config, Arc::new(synthetic_feed())).expect("engine should build")
}

fn temp_path(test_name: &str, ext: &str) -> std::path::PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("fuelcast-{}-{}.{}", test_name, ts, ext))
}

fn price_on(paths: &[ForecastPath], region: &str, day: usize) -> f64 {
    paths
        .iter()
        .find(|p| p.region == region)
        .and_then(|p| p.points.get(day - 1))
        .map(|p| p.price)
        .expect("point should exist")
}

#[tokio::test]
/// Single +1% factor, full weight, zero variance, limit 1%: the move passes unclamped.
async fn single_factor_within_daily_limit_is_unclamped() {
    let engine = empty_engine(scenario_config(vec![trend_factor("crude", 1.0, 0.01)], Some(0.01)));
    let paths = engine
        .generate_forecast(FuelType::Gasoline, 1, &MarketSnapshot::national(as_of(), 1700.0))
        .await
        .unwrap();

    assert_eq!(paths.len(), 2);
    let point = paths[0].points[0];
    assert!((point.price - 1717.0).abs() < 1e-9);
    assert!((point.lower - point.price).abs() < 1e-9);
    assert!((point.upper - point.price).abs() < 1e-9);
    assert!((price_on(&paths, NATIONAL_REGION_CODE, 1) - 1717.0).abs() < 1e-9);
}

#[tokio::test]
/// Same setup with a 0.5% daily limit: the impact is truncated to the limit.
async fn single_factor_beyond_daily_limit_is_clamped() {
    let engine = empty_engine(scenario_config(vec![trend_factor("crude", 1.0, 0.01)], Some(0.005)));
    let paths = engine
        .generate_forecast(FuelType::Gasoline, 1, &MarketSnapshot::national(as_of(), 1700.0))
        .await
        .unwrap();

    assert!((price_on(&paths, "metro", 1) - 1708.5).abs() < 1e-9);
}

#[tokio::test]
/// Full catalogue over synthetic history: every path respects the daily clamp,
/// the absolute band and interval ordering.
async fn catalogue_paths_hold_constraint_invariants() {
    let engine = catalogue_engine();
    for fuel in FuelType::ALL {
        let snapshot = MarketSnapshot::national(as_of(), 1650.0).with_regional("seoul", 1720.0);
        let paths = engine.generate_forecast(fuel, 14, &snapshot).await.unwrap();
        let limit = engine.config().fuel_profile(fuel).unwrap().daily_volatility_limit();

        assert_eq!(paths.len(), engine.config().regions.len() + 1);
        assert_eq!(paths.last().unwrap().region, NATIONAL_REGION_CODE);
        for path in &paths {
            assert_eq!(path.horizon(), 14);
            let mut prev = path.current_price;
            for point in &path.points {
                assert!((point.price - prev).abs() <= prev * limit + 1e-9, "{}", path.region);
                assert!(point.price >= 0.5 * path.current_price - 1e-9);
                assert!(point.price <= 1.5 * path.current_price + 1e-9);
                assert!(point.lower <= point.price && point.price <= point.upper);
                assert!((0.5..=1.0).contains(&point.confidence));
                prev = point.price;
            }
        }
    }
}

#[tokio::test]
/// Identical observations and weight set yield bit-identical paths.
async fn repeated_runs_are_deterministic() {
    let engine = catalogue_engine();
    let snapshot = MarketSnapshot::national(as_of(), 1700.0);
    let first = engine.generate_forecast(FuelType::Diesel, 7, &snapshot).await.unwrap();
    let second = engine.generate_forecast(FuelType::Diesel, 7, &snapshot).await.unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.region, b.region);
        assert_eq!(a.current_price.to_bits(), b.current_price.to_bits());
        assert_eq!(a.points, b.points);
    }
}

#[tokio::test]
/// A factor with no history degrades without failing the run.
async fn degraded_factor_is_not_fatal() {
    let mut config = Config::default();
    config.factors = vec![
        trend_factor("crude", 0.6, 0.001),
        Factor {
            id: "singapore_product".to_string(),
            category: FactorCategory::International,
            static_weight: 0.4,
            pass_through: 1.0,
            lookback_days: 60,
            active: true,
            forecaster: ForecasterSpec::ArHoltHybrid(ArHoltHybridConfig::default()),
        },
    ];
    let engine = empty_engine(config);
    let (_tx, rx) = watch::channel(false);
    let run = engine
        .run_forecast(FuelType::Gasoline, 5, &MarketSnapshot::national(as_of(), 1700.0), rx)
        .await
        .unwrap();

    assert_eq!(run.degraded, vec!["singapore_product".to_string()]);
    assert_eq!(run.paths.len(), 18);
    assert!(run.paths.iter().all(|p| p.horizon() == 5));
    let national = run.national().unwrap();
    assert!(national.points[4].upper > national.points[4].lower);
}

#[tokio::test]
/// Observed regional prices anchor day 0; otherwise the structural premium applies.
async fn regional_anchor_prefers_observed_price() {
    let mut config = Config::default();
    config.factors = vec![trend_factor("crude", 1.0, 0.0)];
    let engine = empty_engine(config);
    let snapshot = MarketSnapshot::national(as_of(), 1700.0).with_regional("busan", 1690.0);
    let paths = engine.generate_forecast(FuelType::Gasoline, 1, &snapshot).await.unwrap();

    let busan = paths.iter().find(|p| p.region == "busan").unwrap();
    let seoul = paths.iter().find(|p| p.region == "seoul").unwrap();
    assert!((busan.current_price - 1690.0).abs() < 1e-9);
    assert!((seoul.current_price - 1700.0 * 1.0205).abs() < 1e-9);
}

#[tokio::test]
/// A cancelled run returns `Cancelled` and archives nothing.
async fn cancelled_run_publishes_nothing() {
    let engine = empty_engine(scenario_config(vec![trend_factor("crude", 1.0, 0.01)], None));
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let err = engine
        .run_forecast(FuelType::Gasoline, 3, &MarketSnapshot::national(as_of(), 1700.0), rx)
        .await
        .unwrap_err();

    assert!(matches!(err, ForecastError::Cancelled));
    assert_eq!(engine.archived_runs().await, 0);
    let missing = engine
        .record_actual("metro", FuelType::Gasoline, as_of() + Duration::days(1), 1700.0)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn horizon_outside_range_is_rejected() {
    let engine = empty_engine(scenario_config(vec![trend_factor("crude", 1.0, 0.01)], None));
    let snapshot = MarketSnapshot::national(as_of(), 1700.0);
    for horizon in [0, 29] {
        let pending = engine.generate_forecast(FuelType::Gasoline, horizon, &snapshot);
        let err = tokio_test::block_on(pending).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidHorizon { max: 28, .. }));
    }
}

#[tokio::test]
async fn structural_configuration_errors_abort() {
    let bad_weights = scenario_config(vec![trend_factor("crude", 0.5, 0.01)], None);
    let err = ForecastEngine::new(bad_weights, Arc::new(InMemoryFeed::new())).err().unwrap();
    assert!(matches!(err, ForecastError::InvalidConfiguration(_)));

    let mut no_diesel = scenario_config(vec![trend_factor("crude", 1.0, 0.01)], None);
    no_diesel.fuels.retain(|f| f.fuel == FuelType::Gasoline);
    let engine = empty_engine(no_diesel);
    let err = engine
        .generate_forecast(FuelType::Diesel, 3, &MarketSnapshot::national(as_of(), 1600.0))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
/// Three days of a forecast overstated mostly by one factor pull that factor's
/// weight below its static baseline.
async fn accuracy_feedback_lowers_overstating_factor() {
    let engine = empty_engine(scenario_config(
        vec![trend_factor("f", 0.5, 0.02), trend_factor("g", 0.5, 0.001)],
        None,
    ));
    let before = engine.get_weights();
    assert_eq!(before.generation, 0);
    assert!((before.get("f") - 0.5).abs() < 1e-12);
    assert!((engine.dynamic_weights().await["f"] - 0.5).abs() < 1e-12);

    engine
        .generate_forecast(FuelType::Gasoline, 3, &MarketSnapshot::national(as_of(), 1700.0))
        .await
        .unwrap();
    for day in 1..=3 {
        let record = engine
            .record_actual("metro", FuelType::Gasoline, as_of() + Duration::days(day), 1700.0)
            .await
            .unwrap()
            .expect("archived forecast should cover the date");
        assert_eq!(record.day_offset, day as usize);
        assert!(record.pct_error > 0.0);
    }

    let after = engine.get_weights();
    assert_eq!(after.generation, 3);
    assert!(after.is_normalized());
    assert!(after.get("f") < before.get("f"));
    assert!(after.get("g") > before.get("g"));
    assert!(engine.dynamic_weights().await["f"] < 0.5);
    // snapshots handed out earlier are untouched
    assert_eq!(before.generation, 0);

    let report = engine.accuracy_report().await;
    assert_eq!(report.overall.samples, 3);
    assert_eq!(report.entries.len(), 1);
}

#[tokio::test]
/// Weights and the accuracy log survive an engine restart.
async fn persisted_state_is_restored_on_restart() {
    let db = temp_path("engine-accuracy", "sqlite");
    let snapshot_path = temp_path("engine-weights", "json");
    let make_config = || {
        let mut config = scenario_config(
            vec![trend_factor("f", 0.5, 0.02), trend_factor("g", 0.5, 0.001)],
            None,
        );
        config.store.accuracy_db = Some(db.clone());
        config.store.weight_snapshot = Some(snapshot_path.clone());
        config
    };

    let engine = empty_engine(make_config());
    engine
        .generate_forecast(FuelType::Gasoline, 2, &MarketSnapshot::national(as_of(), 1700.0))
        .await
        .unwrap();
    engine
        .record_actual("metro", FuelType::Gasoline, as_of() + Duration::days(1), 1700.0)
        .await
        .unwrap()
        .expect("record should be produced");
    let learned = engine.get_weights();

    let restarted = empty_engine(make_config());
    let restored = restarted.get_weights();
    assert_eq!(restored.generation, learned.generation);
    assert!((restored.get("f") - learned.get("f")).abs() < 1e-12);
    assert_eq!(restarted.accuracy_records().await.len(), 1);

    let _ = std::fs::remove_file(&db);
    let _ = std::fs::remove_file(&snapshot_path);
}

async fn record_day(engine: &ForecastEngine, day: i64) {
    engine
        .record_actual("metro", FuelType::Gasoline, as_of() + Duration::days(day), 1700.0)
        .await
        .unwrap()
        .expect("archived forecast should cover the date");
}

#[tokio::test]
/// Replaying the accuracy log restores attribution, metrics and the weights
/// the next publish produces, with or without a weight snapshot.
async fn accuracy_log_replay_restores_learned_weights() {
    let db = temp_path("replay-accuracy", "sqlite");
    let snapshot_path = temp_path("replay-weights", "json");
    let make_config = |snapshot: bool| {
        let mut config = scenario_config(
            vec![trend_factor("f", 0.5, 0.02), trend_factor("g", 0.5, 0.001)],
            None,
        );
        config.store.accuracy_db = Some(db.clone());
        if snapshot {
            config.store.weight_snapshot = Some(snapshot_path.clone());
        }
        config
    };
    let snapshot = MarketSnapshot::national(as_of(), 1700.0);

    // Uninterrupted run for comparison.
    let reference = empty_engine(scenario_config(
        vec![trend_factor("f", 0.5, 0.02), trend_factor("g", 0.5, 0.001)],
        None,
    ));
    reference.generate_forecast(FuelType::Gasoline, 4, &snapshot).await.unwrap();
    for day in 1..=3 {
        record_day(&reference, day).await;
    }
    reference.generate_forecast(FuelType::Gasoline, 4, &snapshot).await.unwrap();
    record_day(&reference, 4).await;
    let expected = reference.get_weights();

    let engine = empty_engine(make_config(true));
    engine.generate_forecast(FuelType::Gasoline, 4, &snapshot).await.unwrap();
    for day in 1..=3 {
        record_day(&engine, day).await;
    }
    let learned = engine.get_weights();
    let learned_dynamic = engine.dynamic_weights().await;
    assert!(learned_dynamic["f"] < 0.5);
    drop(engine);

    let restarted = empty_engine(make_config(true));
    assert_eq!(restarted.get_weights().generation, 3);
    assert_eq!(restarted.accuracy_report().await.overall.samples, 3);
    assert_eq!(restarted.accuracy_report().await.entries.len(), 1);
    let dynamic = restarted.dynamic_weights().await;
    assert!((dynamic["f"] - learned_dynamic["f"]).abs() < 1e-12);

    restarted.generate_forecast(FuelType::Gasoline, 4, &snapshot).await.unwrap();
    record_day(&restarted, 4).await;
    let after = restarted.get_weights();
    assert_eq!(after.generation, 4);
    assert!((after.get("f") - expected.get("f")).abs() < 1e-12);
    assert!(after.get("f") <= learned.get("f") + 1e-12);
    assert_eq!(restarted.accuracy_report().await.overall.samples, 4);
    drop(restarted);

    // Without a snapshot the weights are rebuilt from the log alone.
    let from_log = empty_engine(make_config(false));
    let rebuilt = from_log.get_weights();
    assert_eq!(rebuilt.generation, 1);
    assert!((rebuilt.get("f") - expected.get("f")).abs() < 1e-12);
    assert_eq!(from_log.accuracy_records().await.len(), 4);

    let _ = std::fs::remove_file(&db);
    let _ = std::fs::remove_file(&snapshot_path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
/// Concurrent actuals publish one generation each, and the newest generation
/// reflects every recorded actual.
async fn concurrent_actuals_publish_consistent_generations() {
    let engine = Arc::new(empty_engine(scenario_config(
        vec![
            trend_factor("f", 0.4, 0.02),
            trend_factor("g", 0.3, 0.001),
            trend_factor("h", 0.3, -0.004),
        ],
        None,
    )));
    engine
        .generate_forecast(FuelType::Gasoline, 7, &MarketSnapshot::national(as_of(), 1700.0))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for day in 1..=7 {
        for (region, price) in [("metro", 1702.0 + day as f64), (NATIONAL_REGION_CODE, 1695.0)] {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .record_actual(region, FuelType::Gasoline, as_of() + Duration::days(day), price)
                    .await
            }));
        }
    }
    for handle in handles {
        let record = handle.await.expect("task should not panic").unwrap();
        assert!(record.is_some());
    }

    let published = engine.get_weights();
    assert_eq!(published.generation, 14);
    assert_eq!(engine.accuracy_records().await.len(), 14);
    let expected = engine.effective_weights().await;
    for (id, weight) in &expected {
        assert!((published.get(id) - weight).abs() < 1e-12, "{id} drifted");
    }
}

#[derive(Debug)]
struct SlowForecaster {
    delay: std::time::Duration,
}

impl FactorForecaster for SlowForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::ConstantTrend
    }

    fn min_history(&self) -> usize {
        0
    }

    fn project(
        &self,
        _: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        std::thread::sleep(self.delay);
        let mut projection = Projection::with_capacity(ctx.horizon);
        for _ in 0..ctx.horizon {
            projection.push(0.05, 0.0);
        }
        Ok(projection)
    }
}

#[tokio::test]
/// A forecaster that overruns its deadline is degraded and the run still
/// returns a full path for every region.
async fn overrunning_forecaster_is_degraded() {
    let mut config = scenario_config(
        vec![trend_factor("slow", 0.5, 0.01), trend_factor("fast", 0.5, 0.002)],
        None,
    );
    config.regions = vec![flat_region("metro"), flat_region("coast")];
    config.engine.forecaster_timeout_ms = 20;
    let slow = Arc::new(SlowForecaster {
        delay: std::time::Duration::from_millis(400),
    });
    let engine = empty_engine(config).with_forecaster("slow", slow).unwrap();

    let (_tx, rx) = watch::channel(false);
    let run = engine
        .run_forecast(FuelType::Gasoline, 5, &MarketSnapshot::national(as_of(), 1700.0), rx)
        .await
        .unwrap();

    assert!(run.degraded.contains(&"slow".to_string()));
    assert_eq!(run.paths.len(), 3);
    for path in &run.paths {
        assert_eq!(path.points.len(), 5);
        assert!(path.points.iter().all(|p| p.price.is_finite()));
    }
    let slow_obs: Vec<_> = run.observations.iter().filter(|o| o.factor_id == "slow").collect();
    assert_eq!(slow_obs.len(), 5);
    assert!(slow_obs.iter().all(|o| o.degraded));
    // the 5% daily projection never reaches the blend
    assert!(price_on(&run.paths, NATIONAL_REGION_CODE, 5) < 1700.0 * 1.05);
}

#[test]
fn attaching_a_forecaster_to_an_unknown_factor_is_rejected() {
    let engine = empty_engine(scenario_config(vec![trend_factor("f", 1.0, 0.0)], None));
    let slow = Arc::new(SlowForecaster {
        delay: std::time::Duration::from_millis(1),
    });
    let err = engine.with_forecaster("missing", slow).err().expect("unknown id should fail");
    assert!(matches!(err, ForecastError::InvalidConfiguration(_)));
}
