use serde::{Deserialize, Serialize};

use super::numerics::{dot, log_returns, residual_variance, ridge_fit};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeRegressionConfig {
    pub lags: usize,
    /// Exogenous series whose lagged returns enter as regressors; held at zero return ahead.
    pub regressors: Vec<String>,
    pub lambda: f64,
    pub return_clip: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for RidgeRegressionConfig {
    fn default() -> Self {
        Self {
            lags: 5,
            regressors: vec!["dubai_crude".to_string(), "usd_krw".to_string()],
            lambda: 0.01,
            return_clip: 0.05,
            min_sigma: 0.001,
            min_history: 20,
        }
    }
}

/// Autoregression on lagged daily returns plus lagged exogenous returns, ridge-penalized.
#[derive(Debug, Clone, Default)]
pub struct RidgeRegressionForecaster {
    cfg: RidgeRegressionConfig,
}

impl RidgeRegressionForecaster {
    pub fn new(cfg: RidgeRegressionConfig) -> Self {
        Self { cfg }
    }
}

impl FactorForecaster for RidgeRegressionForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::RidgeRegression
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(self.cfg.lags + 5)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        require_last(&window.values())?;
        let own = log_returns(&window.values());
        let exo: Vec<Vec<f64>> = self
            .cfg
            .regressors
            .iter()
            .filter_map(|name| window.companion(name))
            .map(log_returns)
            .filter(|r| r.len() >= own.len())
            .map(|r| r[r.len() - own.len()..].to_vec())
            .collect();
        let lags = self.cfg.lags.max(1);
        if own.len() <= lags + 2 {
            return Err(FactorFailure::InsufficientHistory {
                required: lags + 4,
                available: own.len() + 1,
            });
        }

        let features = |hist: &[f64], t: usize, exo_at: &dyn Fn(usize) -> f64| {
            let mut row = Vec::with_capacity(1 + lags + exo.len());
            row.push(1.0);
            row.extend((1..=lags).map(|l| hist[t - l]));
            row.extend((0..exo.len()).map(exo_at));
            row
        };

        let mut rows = Vec::with_capacity(own.len() - lags);
        let mut y = Vec::with_capacity(own.len() - lags);
        for t in lags..own.len() {
            rows.push(features(&own, t, &|j| exo[j][t - 1]));
            y.push(own[t]);
        }
        let beta = ridge_fit(&rows, &y, self.cfg.lambda, false)
            .ok_or_else(|| FactorFailure::Numerical("singular ridge system".to_string()))?;
        let sigma2 = residual_variance(&rows, &y, &beta).max(self.cfg.min_sigma.powi(2));

        let mut hist = own.clone();
        let mut out = Projection::with_capacity(ctx.horizon);
        let mut cum = 0.0;
        for h in 1..=ctx.horizon {
            let t = hist.len();
            let row = features(&hist, t, &|j| if h == 1 { exo[j][t - 1] } else { 0.0 });
            let r = dot(&row, &beta).clamp(-self.cfg.return_clip, self.cfg.return_clip);
            hist.push(r);
            cum += r;
            out.push(cum.exp() - 1.0, sigma2 * h as f64);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolynomialRidgeConfig {
    pub degree: usize,
    pub lambda: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for PolynomialRidgeConfig {
    fn default() -> Self {
        Self {
            degree: 2,
            lambda: 1e-3,
            min_sigma: 5e-4,
            min_history: 30,
        }
    }
}

/// Polynomial trend in time fitted to log levels, for slow-moving structural series.
#[derive(Debug, Clone, Default)]
pub struct PolynomialRidgeForecaster {
    cfg: PolynomialRidgeConfig,
}

impl PolynomialRidgeForecaster {
    pub fn new(cfg: PolynomialRidgeConfig) -> Self {
        Self { cfg }
    }

    fn basis(&self, x: f64) -> Vec<f64> {
        (0..=self.cfg.degree.clamp(1, 4))
            .map(|p| x.powi(p as i32))
            .collect()
    }
}

impl FactorForecaster for PolynomialRidgeForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::PolynomialRidge
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(self.cfg.degree + 3)
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
        let scale = (n - 1).max(1) as f64;
        let rows: Vec<Vec<f64>> = (0..n).map(|i| self.basis(i as f64 / scale)).collect();
        let y: Vec<f64> = values.iter().map(|v| v.ln()).collect();
        let beta = ridge_fit(&rows, &y, self.cfg.lambda, false)
            .ok_or_else(|| FactorFailure::Numerical("singular polynomial system".to_string()))?;
        let sigma2 = residual_variance(&rows, &y, &beta).max(self.cfg.min_sigma.powi(2));

        let base = dot(&self.basis(1.0), &beta);
        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            let x = (n - 1 + h) as f64 / scale;
            let fitted = dot(&self.basis(x), &beta);
            out.push((fitted - base).exp() - 1.0, sigma2 * (1.0 + h as f64 / n as f64));
        }
        Ok(out)
    }
}
