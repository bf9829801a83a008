use serde::{Deserialize, Serialize};

use super::numerics::{autocorrelation, log_returns, mean, variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArHoltHybridConfig {
    pub holt_alpha: f64,
    pub holt_beta: f64,
    /// Damping applied to the Holt trend per day ahead.
    pub trend_damping: f64,
    /// Share of the AR(1) return path in the blend; the rest is Holt.
    pub ar_weight: f64,
    pub max_phi: f64,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for ArHoltHybridConfig {
    fn default() -> Self {
        Self {
            holt_alpha: 0.3,
            holt_beta: 0.1,
            trend_damping: 0.98,
            ar_weight: 0.5,
            max_phi: 0.95,
            min_sigma: 0.002,
            min_history: 10,
        }
    }
}

/// AR(1) on daily log returns blended with damped Holt smoothing on log levels.
#[derive(Debug, Clone, Default)]
pub struct ArHoltHybridForecaster {
    cfg: ArHoltHybridConfig,
}

impl ArHoltHybridForecaster {
    pub fn new(cfg: ArHoltHybridConfig) -> Self {
        Self { cfg }
    }

    fn holt_trend(&self, log_levels: &[f64]) -> f64 {
        let a = self.cfg.holt_alpha.clamp(0.01, 1.0);
        let b = self.cfg.holt_beta.clamp(0.0, 1.0);
        let mut level = log_levels[0];
        let mut trend = log_levels[1] - log_levels[0];
        for y in &log_levels[1..] {
            let prev_level = level;
            level = a * y + (1.0 - a) * (level + trend);
            trend = b * (level - prev_level) + (1.0 - b) * trend;
        }
        trend
    }
}

impl FactorForecaster for ArHoltHybridForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::ArHoltHybrid
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
        if values.iter().any(|v| *v <= 0.0) {
            return Err(FactorFailure::Numerical(
                "non-positive level in log model".to_string(),
            ));
        }
        let returns = log_returns(&values);
        let log_levels: Vec<f64> = values.iter().map(|v| v.ln()).collect();

        let mu = mean(&returns);
        let phi = autocorrelation(&returns).clamp(-self.cfg.max_phi, self.cfg.max_phi);
        let last_r = returns.last().copied().unwrap_or(0.0);
        let trend = self.holt_trend(&log_levels);
        let sigma2 = variance(&returns).max(self.cfg.min_sigma.powi(2));
        let w = self.cfg.ar_weight.clamp(0.0, 1.0);

        let mut out = Projection::with_capacity(ctx.horizon);
        let mut ar_cum = 0.0;
        let mut holt_cum = 0.0;
        let mut phi_k = 1.0;
        let mut damp_k = 1.0;
        for h in 1..=ctx.horizon {
            phi_k *= phi;
            damp_k *= self.cfg.trend_damping;
            ar_cum += mu + phi_k * (last_r - mu);
            holt_cum += damp_k * trend;
            let blended = w * ar_cum + (1.0 - w) * holt_cum;
            out.push(blended.exp() - 1.0, sigma2 * h as f64);
        }
        Ok(out)
    }
}
