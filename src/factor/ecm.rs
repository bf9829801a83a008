use serde::{Deserialize, Serialize};

use super::numerics::{dot, ols_fit, residual_variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorCorrectionConfig {
    /// Companion series the factor is cointegrated with.
    pub partner: String,
    /// Adjustment speeds outside `[-max_speed, 0]` are clamped into it.
    pub max_speed: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for ErrorCorrectionConfig {
    fn default() -> Self {
        Self {
            partner: "dubai_crude".to_string(),
            max_speed: 0.5,
            min_sigma: 5e-4,
            min_history: 30,
        }
    }
}

/// Two-step Engle-Granger error-correction model against a partner series.
/// The partner is held at its last level over the horizon.
#[derive(Debug, Clone, Default)]
pub struct ErrorCorrectionForecaster {
    cfg: ErrorCorrectionConfig,
}

impl ErrorCorrectionForecaster {
    pub fn new(cfg: ErrorCorrectionConfig) -> Self {
        Self { cfg }
    }
}

impl FactorForecaster for ErrorCorrectionForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::ErrorCorrection
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(8)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let values = window.values();
        require_last(&values)?;
        let partner = window
            .companion(&self.cfg.partner)
            .ok_or_else(|| FactorFailure::Unavailable(format!("partner {}", self.cfg.partner)))?;
        let n = values.len().min(partner.len());
        if n < 8 {
            return Err(FactorFailure::InsufficientHistory {
                required: 8,
                available: n,
            });
        }
        let y = &values[values.len() - n..];
        let x = &partner[partner.len() - n..];
        if y.iter().chain(x).any(|v| *v <= 0.0) {
            return Err(FactorFailure::Numerical(
                "non-positive level in log model".to_string(),
            ));
        }
        let ly: Vec<f64> = y.iter().map(|v| v.ln()).collect();
        let lx: Vec<f64> = x.iter().map(|v| v.ln()).collect();

        let long_rows: Vec<Vec<f64>> = lx.iter().map(|v| vec![1.0, *v]).collect();
        let long_run = ols_fit(&long_rows, &ly)
            .ok_or_else(|| FactorFailure::Numerical("singular cointegrating fit".to_string()))?;
        let resid: Vec<f64> = ly
            .iter()
            .zip(&long_rows)
            .map(|(v, row)| v - dot(row, &long_run))
            .collect();

        let mut rows = Vec::with_capacity(n - 2);
        let mut dy = Vec::with_capacity(n - 2);
        for t in 2..n {
            rows.push(vec![1.0, resid[t - 1], lx[t - 1] - lx[t - 2]]);
            dy.push(ly[t] - ly[t - 1]);
        }
        let short_run = ols_fit(&rows, &dy)
            .ok_or_else(|| FactorFailure::Numerical("singular error-correction fit".to_string()))?;
        let gamma = short_run[1].clamp(-self.cfg.max_speed, 0.0);
        let sigma2 = residual_variance(&rows, &dy, &short_run).max(self.cfg.min_sigma.powi(2));

        let mut u = resid[n - 1];
        let mut last_dx = lx[n - 1] - lx[n - 2];
        let mut cum = 0.0;
        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            let step = short_run[0] + gamma * u + short_run[2] * last_dx;
            last_dx = 0.0;
            u += step;
            cum += step;
            out.push(cum.exp() - 1.0, sigma2 * h as f64);
        }
        Ok(out)
    }
}
