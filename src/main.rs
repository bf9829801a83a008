use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tokio::sync::watch;

use fuelcast::config::Config;
use fuelcast::engine::ForecastEngine;
use fuelcast::factor::HistoryWindow;
use fuelcast::feed::{synthetic_series, InMemoryFeed, MarketSnapshot};
use fuelcast::model::fuel::FuelType;

const HISTORY_DAYS: usize = 400;

/// (factor, level, daily trend, weekly wave) for the demo feed.
const SYNTHETIC_FACTORS: &[(&str, f64, f64, f64)] = &[
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

fn demo_feed(as_of: NaiveDate) -> InMemoryFeed {
    let mut feed = InMemoryFeed::new();
    for (id, level, trend, wave) in SYNTHETIC_FACTORS {
        let values = synthetic_series(*level, *trend, *wave, HISTORY_DAYS);
        feed.insert(HistoryWindow::from_values(*id, as_of, &values));
    }
    feed
}

fn demo_snapshot(fuel: FuelType, as_of: NaiveDate) -> MarketSnapshot {
    match fuel {
        FuelType::Gasoline => {
            MarketSnapshot::national(as_of, 1_702.0).with_regional("seoul", 1_781.0)
        }
        FuelType::Diesel => {
            MarketSnapshot::national(as_of, 1_578.0).with_regional("seoul", 1_652.0)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set FUELCAST_CONFIG or create config/default.toml");
            std::process::exit(1);
        }
    };

    let log_file = std::fs::File::create(&config.logging.file)
        .with_context(|| format!("failed to create log file {}", config.logging.file))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .logging
                    .level
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    let as_of = Utc::now().date_naive();
    let horizon = config.engine.default_horizon;
    tracing::info!(
        %as_of,
        horizon,
        factors = config.active_factors().count(),
        regions = config.regions.len(),
        "Starting fuelcast"
    );

    let engine = ForecastEngine::new(config, Arc::new(demo_feed(as_of)))
        .context("failed to build forecast engine")?;
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let mut runs = Vec::with_capacity(FuelType::ALL.len());
    for fuel in FuelType::ALL {
        let run = engine
            .run_forecast(fuel, horizon, &demo_snapshot(fuel, as_of), cancel_rx.clone())
            .await
            .with_context(|| format!("forecast for {fuel} failed"))?;
        runs.push(run);
    }

    println!("{}", serde_json::to_string_pretty(&runs)?);
    Ok(())
}
