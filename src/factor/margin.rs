use serde::{Deserialize, Serialize};

use super::numerics::{mean, variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginEquilibriumConfig {
    /// Retailer bargaining power in the Nash split of the channel surplus.
    pub bargaining_power: f64,
    /// Companion holding the total channel surplus. Without it, the trailing
    /// margin mean divided by `historical_share` is used.
    pub surplus_series: String,
    pub historical_share: f64,
    pub surplus_days: usize,
    /// Daily mean-reversion speed toward the equilibrium margin.
    pub reversion: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for MarginEquilibriumConfig {
    fn default() -> Self {
        Self {
            bargaining_power: 0.5,
            surplus_series: "channel_surplus".to_string(),
            historical_share: 0.5,
            surplus_days: 60,
            reversion: 0.1,
            min_sigma: 0.002,
            min_history: 14,
        }
    }
}

/// Retail margin reverting to the Nash bargaining equilibrium `m* = β·S`.
#[derive(Debug, Clone, Default)]
pub struct MarginEquilibriumForecaster {
    cfg: MarginEquilibriumConfig,
}

impl MarginEquilibriumForecaster {
    pub fn new(cfg: MarginEquilibriumConfig) -> Self {
        Self { cfg }
    }

    pub fn equilibrium(&self, window: &HistoryWindow) -> Option<f64> {
        let beta = self.cfg.bargaining_power.clamp(0.0, 1.0);
        if let Some(surplus) = window
            .companion(&self.cfg.surplus_series)
            .and_then(|s| s.last().copied())
        {
            return Some(beta * surplus);
        }
        let values = window.values();
        if values.is_empty() || self.cfg.historical_share <= f64::EPSILON {
            return None;
        }
        let span = self.cfg.surplus_days.clamp(1, values.len());
        let implied_surplus = mean(&values[values.len() - span..]) / self.cfg.historical_share;
        Some(beta * implied_surplus)
    }
}

impl FactorForecaster for MarginEquilibriumForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::MarginEquilibrium
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(2)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let values = window.values();
        let last = require_last(&values)?;
        let target = self
            .equilibrium(window)
            .ok_or_else(|| FactorFailure::Unavailable("channel surplus".to_string()))?;
        let rel: Vec<f64> = values
            .windows(2)
            .filter(|w| w[0].abs() > f64::EPSILON)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        let sigma2 = variance(&rel).max(self.cfg.min_sigma.powi(2));
        let keep = 1.0 - self.cfg.reversion.clamp(0.0, 1.0);

        let mut out = Projection::with_capacity(ctx.horizon);
        let mut gap = last - target;
        for h in 1..=ctx.horizon {
            gap *= keep;
            out.push((target + gap) / last - 1.0, sigma2 * h as f64);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fuel::default_fuel_profiles;
    use chrono::NaiveDate;

    fn ctx() -> ForecastContext {
        ForecastContext {
            as_of: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            horizon: 7,
            fuel: default_fuel_profiles()[0].clone(),
            pass_through: 1.0,
            degraded_variance: 1e-4,
        }
    }

    #[test]
    fn margin_above_equilibrium_reverts_down() {
        let mut values = vec![100.0; 20];
        values.push(130.0);
        let window = HistoryWindow::from_values("retail_margin", ctx().as_of, &values)
            .with_companion("channel_surplus", vec![200.0]);
        let fc = MarginEquilibriumForecaster::default();
        assert_eq!(fc.equilibrium(&window), Some(100.0));
        let pred = fc.predict(&window, &ctx());
        assert!(pred.impacts[0] < 0.0);
        assert!(pred.impacts[6] < pred.impacts[0]);
    }
}
