use std::f64::consts::PI;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::numerics::{dot, mean, residual_variance, ridge_fit, variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalInventoryConfig {
    /// Trailing window defining the "normal" stock level.
    pub baseline_days: usize,
    /// Daily rate at which a stock surplus or deficit is worked off.
    pub decay: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for SeasonalInventoryConfig {
    fn default() -> Self {
        Self {
            baseline_days: 30,
            decay: 0.05,
            min_sigma: 0.002,
            min_history: 14,
        }
    }
}

/// Stock surplus against a trailing baseline, turned into price pressure through the
/// fuel's demand elasticity and decayed as the surplus is worked off.
#[derive(Debug, Clone, Default)]
pub struct SeasonalInventoryForecaster {
    cfg: SeasonalInventoryConfig,
}

impl SeasonalInventoryForecaster {
    pub fn new(cfg: SeasonalInventoryConfig) -> Self {
        Self { cfg }
    }

    /// Relative deviation of the latest stock level from its trailing mean.
    pub fn surplus(&self, values: &[f64]) -> Option<f64> {
        let last = *values.last()?;
        let span = self.cfg.baseline_days.clamp(2, values.len());
        let baseline = mean(&values[values.len() - span..]);
        (baseline > f64::EPSILON).then(|| (last - baseline) / baseline)
    }
}

impl FactorForecaster for SeasonalInventoryForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::SeasonalInventory
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
        let surplus = self
            .surplus(&values)
            .ok_or_else(|| FactorFailure::Numerical("zero inventory baseline".to_string()))?;
        let elasticity = ctx.fuel.demand_elasticity;
        let deviations: Vec<f64> = values
            .windows(2)
            .filter(|w| w[0] > f64::EPSILON)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        let sigma2 =
            (variance(&deviations) * elasticity * elasticity).max(self.cfg.min_sigma.powi(2));
        let keep = 1.0 - self.cfg.decay.clamp(0.0, 1.0);

        let mut out = Projection::with_capacity(ctx.horizon);
        let mut remaining = surplus;
        for h in 1..=ctx.horizon {
            remaining *= keep;
            out.push(remaining * elasticity, sigma2 * h as f64);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalRegressionConfig {
    /// Annual Fourier harmonics in the design matrix.
    pub harmonics: usize,
    /// Exogenous companions entered in log levels and held at their last value ahead.
    pub regressors: Vec<String>,
    pub lambda: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for SeasonalRegressionConfig {
    fn default() -> Self {
        Self {
            harmonics: 2,
            regressors: vec!["cpi".to_string()],
            lambda: 1e-3,
            min_sigma: 0.002,
            min_history: 60,
        }
    }
}

/// Log-level regression on a linear trend, annual Fourier terms and exogenous drivers.
#[derive(Debug, Clone, Default)]
pub struct SeasonalRegressionForecaster {
    cfg: SeasonalRegressionConfig,
}

impl SeasonalRegressionForecaster {
    pub fn new(cfg: SeasonalRegressionConfig) -> Self {
        Self { cfg }
    }

    fn design(&self, t: f64, day_of_year: u32, exo: &[f64]) -> Vec<f64> {
        let k = self.cfg.harmonics.min(4);
        let angle = 2.0 * PI * day_of_year as f64 / 365.25;
        let mut row = Vec::with_capacity(2 + 2 * k + exo.len());
        row.push(1.0);
        row.push(t);
        for h in 1..=k {
            row.push((angle * h as f64).sin());
            row.push((angle * h as f64).cos());
        }
        row.extend_from_slice(exo);
        row
    }
}

impl FactorForecaster for SeasonalRegressionForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::SeasonalRegression
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(2 * self.cfg.harmonics + 6)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let values = window.values();
        require_last(&values)?;
        if values.iter().any(|v| *v <= 0.0) {
            return Err(FactorFailure::Numerical(
                "non-positive level in log model".to_string(),
            ));
        }
        let n = values.len();
        let exo: Vec<Vec<f64>> = self
            .cfg
            .regressors
            .iter()
            .filter_map(|name| window.companion(name))
            .filter(|s| s.len() >= n && s.iter().all(|v| *v > 0.0))
            .map(|s| s[s.len() - n..].iter().map(|v| v.ln()).collect())
            .collect();
        let exo_at = |i: usize| -> Vec<f64> { exo.iter().map(|s| s[i]).collect() };

        let scale = n as f64;
        let rows: Vec<Vec<f64>> = window
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| self.design(i as f64 / scale, p.date.ordinal(), &exo_at(i)))
            .collect();
        let y: Vec<f64> = values.iter().map(|v| v.ln()).collect();
        let beta = ridge_fit(&rows, &y, self.cfg.lambda, false)
            .ok_or_else(|| FactorFailure::Numerical("singular seasonal system".to_string()))?;
        let sigma2 = residual_variance(&rows, &y, &beta).max(self.cfg.min_sigma.powi(2));

        let last_exo = exo_at(n - 1);
        let base = dot(&rows[n - 1], &beta);
        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            let t = (n - 1 + h) as f64 / scale;
            let row = self.design(t, ctx.day_of_year_at(h), &last_exo);
            out.push((dot(&row, &beta) - base).exp() - 1.0, sigma2 * (1.0 + h as f64 / scale));
        }
        Ok(out)
    }
}
