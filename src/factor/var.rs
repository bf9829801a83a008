use serde::{Deserialize, Serialize};

use super::numerics::{dot, log_returns, residual_variance, ridge_fit};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorAutoregressionConfig {
    /// Companion series jointly modelled with the factor. Missing ones are skipped.
    pub companions: Vec<String>,
    pub ridge: f64,
    /// Per-step cap on a projected daily return.
    pub return_clip: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for VectorAutoregressionConfig {
    fn default() -> Self {
        Self {
            companions: vec!["dubai_crude".to_string()],
            ridge: 1e-4,
            return_clip: 0.08,
            min_sigma: 0.002,
            min_history: 20,
        }
    }
}

/// VAR(1) on daily log returns of the factor and its companions, estimated
/// equation by equation with a small ridge penalty.
#[derive(Debug, Clone, Default)]
pub struct VectorAutoregressionForecaster {
    cfg: VectorAutoregressionConfig,
}

impl VectorAutoregressionForecaster {
    pub fn new(cfg: VectorAutoregressionConfig) -> Self {
        Self { cfg }
    }

    /// Own returns first, then every available companion, all truncated to a common tail.
    fn aligned_returns(&self, window: &HistoryWindow) -> Vec<Vec<f64>> {
        let mut series = vec![log_returns(&window.values())];
        for name in &self.cfg.companions {
            if let Some(values) = window.companion(name) {
                let r = log_returns(values);
                if r.len() >= 3 {
                    series.push(r);
                }
            }
        }
        let n = series.iter().map(Vec::len).min().unwrap_or(0);
        series
            .into_iter()
            .map(|s| s[s.len() - n..].to_vec())
            .collect()
    }
}

impl FactorForecaster for VectorAutoregressionForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::VectorAutoregression
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(5)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        require_last(&window.values())?;
        let series = self.aligned_returns(window);
        let k = series.len();
        let n = series[0].len();
        if n < k + 3 {
            return Err(FactorFailure::InsufficientHistory {
                required: k + 4,
                available: n + 1,
            });
        }

        let rows: Vec<Vec<f64>> = (0..n - 1)
            .map(|t| {
                let mut row = Vec::with_capacity(k + 1);
                row.push(1.0);
                row.extend(series.iter().map(|s| s[t]));
                row
            })
            .collect();

        let mut coefs = Vec::with_capacity(k);
        let mut own_resid = 0.0;
        for (eq, target_series) in series.iter().enumerate() {
            let y = &target_series[1..];
            let beta = ridge_fit(&rows, y, self.cfg.ridge, false)
                .ok_or_else(|| FactorFailure::Numerical("singular VAR system".to_string()))?;
            if eq == 0 {
                own_resid = residual_variance(&rows, y, &beta);
            }
            coefs.push(beta);
        }
        let sigma2 = own_resid.max(self.cfg.min_sigma.powi(2));

        let mut state: Vec<f64> = series.iter().map(|s| s[n - 1]).collect();
        let mut out = Projection::with_capacity(ctx.horizon);
        let mut cum = 0.0;
        for h in 1..=ctx.horizon {
            let mut x = Vec::with_capacity(k + 1);
            x.push(1.0);
            x.extend_from_slice(&state);
            state = coefs
                .iter()
                .map(|beta| dot(&x, beta).clamp(-self.cfg.return_clip, self.cfg.return_clip))
                .collect();
            cum += state[0];
            out.push(cum.exp() - 1.0, sigma2 * h as f64);
        }
        Ok(out)
    }
}
