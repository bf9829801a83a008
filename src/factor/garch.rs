use serde::{Deserialize, Serialize};

use super::numerics::{ewma, log_returns, mean, variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

const ALPHA_BETA_MAX_SUM: f64 = 0.999;
const MIN_VARIANCE: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GarchConfig {
    pub alpha: f64,
    pub beta: f64,
    /// Smoothing of the drift estimate; the projected mean return decays toward zero.
    pub drift_alpha: f64,
    pub drift_decay: f64,
    pub min_history: usize,
}

impl Default for GarchConfig {
    fn default() -> Self {
        Self {
            alpha: 0.08,
            beta: 0.90,
            drift_alpha: 0.1,
            drift_decay: 0.9,
            min_history: 30,
        }
    }
}

/// GARCH(1,1) with variance targeting. The mean path is a decaying EWMA drift; the
/// value of the model is the term structure of the conditional variance.
#[derive(Debug, Clone, Default)]
pub struct GarchForecaster {
    cfg: GarchConfig,
}

impl GarchForecaster {
    pub fn new(cfg: GarchConfig) -> Self {
        Self { cfg }
    }

    fn params(&self) -> (f64, f64) {
        let mut alpha = self.cfg.alpha.max(0.0);
        let mut beta = self.cfg.beta.max(0.0);
        if alpha + beta >= ALPHA_BETA_MAX_SUM {
            let s = ALPHA_BETA_MAX_SUM / (alpha + beta);
            alpha *= s;
            beta *= s;
        }
        (alpha, beta)
    }

    /// One-step-ahead conditional variance after filtering the whole sample.
    fn filter(&self, returns: &[f64], omega: f64, alpha: f64, beta: f64) -> f64 {
        let m = mean(returns);
        let mut h = variance(returns).max(MIN_VARIANCE);
        for r in returns {
            let e = r - m;
            h = omega + alpha * e * e + beta * h;
        }
        h
    }
}

impl FactorForecaster for GarchForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Garch
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
        let returns = log_returns(&window.values());
        if returns.len() < 4 {
            return Err(FactorFailure::InsufficientHistory {
                required: 5,
                available: returns.len() + 1,
            });
        }
        let (alpha, beta) = self.params();
        let long_run = variance(&returns).max(MIN_VARIANCE);
        let omega = long_run * (1.0 - alpha - beta);
        let next = self.filter(&returns, omega, alpha, beta);
        if !next.is_finite() {
            return Err(FactorFailure::Numerical("GARCH filter diverged".to_string()));
        }

        let persistence = alpha + beta;
        let drift = ewma(&returns, self.cfg.drift_alpha);
        let mut out = Projection::with_capacity(ctx.horizon);
        let mut cum_mean = 0.0;
        let mut cum_var = 0.0;
        let mut decay = 1.0;
        let mut persist_k = 1.0;
        for _ in 1..=ctx.horizon {
            cum_mean += drift * decay;
            decay *= self.cfg.drift_decay.clamp(0.0, 1.0);
            cum_var += long_run + persist_k * (next - long_run);
            persist_k *= persistence;
            out.push(cum_mean.exp() - 1.0, cum_var);
        }
        Ok(out)
    }
}
