use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::factor::HistoryWindow;
use crate::model::fuel::FuelType;

/// Source of per-factor history. Implementations are expected to be cheap to
/// call repeatedly; errors for one factor degrade only that factor.
pub trait HistoryFeed: Send + Sync {
    fn load_history(&self, factor_id: &str, fuel: FuelType, lookback_days: usize)
        -> Result<HistoryWindow>;
}

/// Day-0 anchor prices for one fuel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub as_of: NaiveDate,
    pub national_price: f64,
    #[serde(default)]
    pub regional_prices: BTreeMap<String, f64>,
}

impl MarketSnapshot {
    pub fn national(as_of: NaiveDate, national_price: f64) -> Self {
        Self {
            as_of,
            national_price,
            regional_prices: BTreeMap::new(),
        }
    }

    pub fn with_regional(mut self, region: &str, price: f64) -> Self {
        self.regional_prices.insert(region.to_string(), price);
        self
    }

    pub fn regional(&self, region: &str) -> Option<f64> {
        self.regional_prices.get(region).copied()
    }
}

/// History held in memory, keyed by factor and optionally by fuel. A fuel-specific
/// series takes precedence over a shared one.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFeed {
    shared: BTreeMap<String, HistoryWindow>,
    by_fuel: BTreeMap<(String, FuelType), HistoryWindow>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, window: HistoryWindow) {
        self.shared.insert(window.factor_id.clone(), window);
    }

    pub fn insert_for_fuel(&mut self, fuel: FuelType, window: HistoryWindow) {
        self.by_fuel.insert((window.factor_id.clone(), fuel), window);
    }

    pub fn with(mut self, window: HistoryWindow) -> Self {
        self.insert(window);
        self
    }

    pub fn len(&self) -> usize {
        self.shared.len() + self.by_fuel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryFeed for InMemoryFeed {
    fn load_history(
        &self,
        factor_id: &str,
        fuel: FuelType,
        lookback_days: usize,
    ) -> Result<HistoryWindow> {
        let window = self
            .by_fuel
            .get(&(factor_id.to_string(), fuel))
            .or_else(|| self.shared.get(factor_id))
            .ok_or_else(|| anyhow!("no history for factor {factor_id} ({fuel})"))?;
        Ok(window.clone().truncated(lookback_days))
    }
}

/// Deterministic synthetic series: a level with a gentle trend and a weekly wave.
pub fn synthetic_series(level: f64, daily_trend: f64, wave: f64, days: usize) -> Vec<f64> {
    (0..days)
        .map(|i| {
            let t = i as f64;
            level * (1.0 + daily_trend * t + wave * (t * std::f64::consts::TAU / 7.0).sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuel_specific_history_wins_and_is_truncated() {
        let as_of = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let mut feed = InMemoryFeed::new();
        feed.insert(HistoryWindow::from_values("inventory", as_of, &[1.0, 2.0, 3.0]));
        feed.insert_for_fuel(
            FuelType::Diesel,
            HistoryWindow::from_values("inventory", as_of, &[7.0, 8.0, 9.0]),
        );
        let g = feed.load_history("inventory", FuelType::Gasoline, 2).unwrap();
        let d = feed.load_history("inventory", FuelType::Diesel, 0).unwrap();
        assert_eq!(g.values(), vec![2.0, 3.0]);
        assert_eq!(d.values(), vec![7.0, 8.0, 9.0]);
        assert!(feed.load_history("cpi", FuelType::Gasoline, 10).is_err());
    }
}
