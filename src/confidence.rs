use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::forecast::ForecastPoint;
use crate::model::region::RegionProfile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Interval half-width in standard deviations. 1.96 approximates a 95%
    /// interval under normality, which the factor errors only loosely follow.
    pub z_multiplier: f64,
    /// Starting reliability score before regional stability and horizon decay.
    pub base_score: f64,
    pub min_score: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            z_multiplier: 1.96,
            base_score: 0.92,
            min_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceEstimator {
    cfg: ConfidenceConfig,
}

impl ConfidenceEstimator {
    pub fn new(cfg: ConfidenceConfig) -> Self {
        Self { cfg }
    }

    /// `(lower, upper)` around `price` for a relative sigma. The lower bound is
    /// floored at zero; zero sigma collapses the interval onto the point.
    pub fn interval(&self, price: f64, relative_sigma: f64) -> (f64, f64) {
        let half = self.cfg.z_multiplier.abs() * relative_sigma.max(0.0) * price.abs();
        ((price - half).max(0.0).min(price), price + half)
    }

    /// Heuristic reliability in `[min_score, 1]`, decaying with the day offset
    /// faster in unstable regions.
    pub fn score(&self, region: Option<&RegionProfile>, day_offset: usize) -> f64 {
        let stability = region.map(RegionProfile::stability_score).unwrap_or(1.0);
        let raw = self.cfg.base_score * stability - day_offset as f64 * 0.01 * (2.0 - stability);
        raw.clamp(self.cfg.min_score, 1.0)
    }

    pub fn points(
        &self,
        region: Option<&RegionProfile>,
        as_of: NaiveDate,
        prices: &[f64],
        relative_sigmas: &[f64],
    ) -> Vec<ForecastPoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, price)| {
                let day_offset = i + 1;
                let sigma = relative_sigmas.get(i).copied().unwrap_or(0.0);
                let (lower, upper) = self.interval(*price, sigma);
                ForecastPoint {
                    day_offset,
                    date: as_of + chrono::Duration::days(day_offset as i64),
                    price: *price,
                    lower,
                    upper,
                    confidence: self.score(region, day_offset),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::region::default_region_profiles;

    #[test]
    fn zero_sigma_collapses_interval() {
        let est = ConfidenceEstimator::default();
        assert_eq!(est.interval(1700.0, 0.0), (1700.0, 1700.0));
    }

    #[test]
    fn interval_uses_z_multiplier() {
        let est = ConfidenceEstimator::default();
        let (lo, hi) = est.interval(1000.0, 0.01);
        assert!((hi - 1019.6).abs() < 1e-9);
        assert!((lo - 980.4).abs() < 1e-9);
    }

    #[test]
    fn score_decays_and_is_floored() {
        let est = ConfidenceEstimator::default();
        let regions = default_region_profiles();
        let seoul = regions.iter().find(|r| r.code == "seoul").unwrap();
        let jeju = regions.iter().find(|r| r.code == "jeju").unwrap();
        let day1 = est.score(Some(seoul), 1);
        let day7 = est.score(Some(seoul), 7);
        assert!(day7 < day1);
        assert!(est.score(Some(seoul), 1) > est.score(Some(jeju), 1));
        assert_eq!(est.score(Some(jeju), 7), 0.5);
    }
}
