use serde::{Deserialize, Serialize};

use super::numerics::{log_returns, mean, variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialHierarchicalConfig {
    /// Companion series for adjacent areas. Empty means every companion in the window.
    pub neighbors: Vec<String>,
    /// Weight of the neighbour mean when pooling growth rates.
    pub shrinkage: f64,
    pub growth_window: usize,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for SpatialHierarchicalConfig {
    fn default() -> Self {
        Self {
            neighbors: Vec::new(),
            shrinkage: 0.5,
            growth_window: 28,
            min_sigma: 0.001,
            min_history: 14,
        }
    }
}

/// Partial pooling of an area's growth rate toward the mean of its neighbours.
#[derive(Debug, Clone, Default)]
pub struct SpatialHierarchicalForecaster {
    cfg: SpatialHierarchicalConfig,
}

impl SpatialHierarchicalForecaster {
    pub fn new(cfg: SpatialHierarchicalConfig) -> Self {
        Self { cfg }
    }

    fn recent_growth(&self, values: &[f64]) -> Option<f64> {
        let r = log_returns(values);
        if r.is_empty() {
            return None;
        }
        let span = self.cfg.growth_window.clamp(1, r.len());
        Some(mean(&r[r.len() - span..]))
    }

    /// Pooled daily log growth and the shrinkage actually applied.
    pub fn pooled_growth(&self, window: &HistoryWindow) -> Option<(f64, f64)> {
        let own = self.recent_growth(&window.values())?;
        let neighbor_rates: Vec<f64> = if self.cfg.neighbors.is_empty() {
            window
                .companions
                .values()
                .filter_map(|s| self.recent_growth(s))
                .collect()
        } else {
            self.cfg
                .neighbors
                .iter()
                .filter_map(|name| window.companion(name))
                .filter_map(|s| self.recent_growth(s))
                .collect()
        };
        if neighbor_rates.is_empty() {
            return Some((own, 0.0));
        }
        let s = self.cfg.shrinkage.clamp(0.0, 1.0);
        Some(((1.0 - s) * own + s * mean(&neighbor_rates), s))
    }
}

impl FactorForecaster for SpatialHierarchicalForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::SpatialHierarchical
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(3)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let values = window.values();
        require_last(&values)?;
        let (growth, s) = self
            .pooled_growth(window)
            .ok_or_else(|| FactorFailure::Numerical("no usable returns".to_string()))?;
        // Pooling removes part of the idiosyncratic noise.
        let sigma2 = (variance(&log_returns(&values)) * (1.0 - 0.5 * s))
            .max(self.cfg.min_sigma.powi(2));

        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            out.push((growth * h as f64).exp() - 1.0, sigma2 * h as f64);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn neighbours_pull_growth_toward_their_mean() {
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let own: Vec<f64> = (0..30).map(|i| 100.0 * (1.01f64).powi(i)).collect();
        let flat = vec![50.0; 30];
        let window = HistoryWindow::from_values("regional_consumption", as_of, &own)
            .with_companion("gyeonggi", flat.clone())
            .with_companion("incheon", flat);
        let fc = SpatialHierarchicalForecaster::default();
        let (pooled, s) = fc.pooled_growth(&window).unwrap();
        assert_eq!(s, 0.5);
        assert!((pooled - 0.5 * (1.01f64).ln()).abs() < 1e-9);
    }
}
