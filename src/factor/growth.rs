use serde::{Deserialize, Serialize};

use super::numerics::{ols_fit, residual_variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturatingGrowthConfig {
    /// Saturation level as a multiple of the largest observed value.
    pub capacity_multiple: f64,
    /// Current zero-emission share of the fleet.
    pub zev_share: f64,
    /// Daily logistic growth rate of the zero-emission share.
    pub zev_growth_rate: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for SaturatingGrowthConfig {
    fn default() -> Self {
        Self {
            capacity_multiple: 1.3,
            zev_share: 0.05,
            zev_growth_rate: 0.0008,
            min_sigma: 1e-4,
            min_history: 30,
        }
    }
}

/// Logistic fleet growth toward a capacity, net of a logistically rising
/// zero-emission share that consumes no liquid fuel.
#[derive(Debug, Clone, Default)]
pub struct SaturatingGrowthForecaster {
    cfg: SaturatingGrowthConfig,
}

impl SaturatingGrowthForecaster {
    pub fn new(cfg: SaturatingGrowthConfig) -> Self {
        Self { cfg }
    }

    /// Zero-emission share `days` ahead of today.
    pub fn zev_share_at(&self, days: f64) -> f64 {
        let s0 = self.cfg.zev_share.clamp(1e-6, 1.0 - 1e-6);
        let logit = (s0 / (1.0 - s0)).ln() + self.cfg.zev_growth_rate * days;
        1.0 / (1.0 + (-logit).exp())
    }
}

impl FactorForecaster for SaturatingGrowthForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::SaturatingGrowth
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(4)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let values = window.values();
        let last = require_last(&values)?;
        let peak = values.iter().copied().fold(f64::MIN, f64::max);
        let capacity = peak * self.cfg.capacity_multiple.max(1.01);

        // ln(K/N - 1) = -r·t + r·t0
        let n = values.len();
        let mut rows = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for (i, v) in values.iter().enumerate() {
            if *v > 0.0 && *v < capacity {
                rows.push(vec![1.0, i as f64]);
                y.push((capacity / v - 1.0).ln());
            }
        }
        if rows.len() < 3 {
            return Err(FactorFailure::Numerical(
                "too few points below capacity".to_string(),
            ));
        }
        let beta = ols_fit(&rows, &y)
            .ok_or_else(|| FactorFailure::Numerical("singular logistic fit".to_string()))?;
        let sigma2 = residual_variance(&rows, &y, &beta).max(self.cfg.min_sigma.powi(2));
        let fitted_at = |t: f64| capacity / (1.0 + (beta[0] + beta[1] * t).exp());

        let base_fleet = fitted_at((n - 1) as f64);
        if base_fleet <= f64::EPSILON {
            return Err(FactorFailure::Numerical("fitted fleet collapsed".to_string()));
        }
        let base = last * (1.0 - self.zev_share_at(0.0));
        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            let fleet = fitted_at((n - 1 + h) as f64) * (1.0 - self.zev_share_at(h as f64));
            let combustion = last / base_fleet * fleet;
            // Logit-scale residual maps to roughly (1 - N/K)^2 on relative level.
            let gap = 1.0 - fitted_at((n - 1 + h) as f64) / capacity;
            out.push(combustion / base - 1.0, sigma2 * gap * gap * h as f64 / n as f64);
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
    fn zev_adoption_offsets_fleet_growth() {
        let values: Vec<f64> = (0..90).map(|i| 25_000.0 + 2.0 * i as f64).collect();
        let window = HistoryWindow::from_values("vehicle_fleet", ctx().as_of, &values);
        let no_zev = SaturatingGrowthForecaster::new(SaturatingGrowthConfig {
            zev_growth_rate: 0.0,
            ..SaturatingGrowthConfig::default()
        })
        .predict(&window, &ctx());
        let with_zev = SaturatingGrowthForecaster::default().predict(&window, &ctx());
        assert!(!no_zev.is_degraded());
        assert!(no_zev.impacts[6] > 0.0);
        assert!(with_zev.impacts[6] < no_zev.impacts[6]);
    }

    #[test]
    fn zev_share_rises_monotonically() {
        let fc = SaturatingGrowthForecaster::default();
        assert!((fc.zev_share_at(0.0) - 0.05).abs() < 1e-9);
        assert!(fc.zev_share_at(30.0) > fc.zev_share_at(0.0));
    }
}
