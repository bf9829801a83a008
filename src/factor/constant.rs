use serde::{Deserialize, Serialize};

use super::{
    FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow, Projection,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstantTrendConfig {
    /// Relative change per day, applied linearly.
    pub daily_trend: f64,
    /// Daily volatility of the factor; variance grows linearly with the horizon.
    pub daily_volatility: f64,
}

/// Fixed linear drift. Used for scenario runs and as a stand-in for factors
/// whose feed is not wired up yet.
#[derive(Debug, Clone, Default)]
pub struct ConstantTrendForecaster {
    cfg: ConstantTrendConfig,
}

impl ConstantTrendForecaster {
    pub fn new(cfg: ConstantTrendConfig) -> Self {
        Self { cfg }
    }
}

impl FactorForecaster for ConstantTrendForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::ConstantTrend
    }

    fn min_history(&self) -> usize {
        0
    }

    fn project(
        &self,
        _window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let var = self.cfg.daily_volatility * self.cfg.daily_volatility;
        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            out.push(self.cfg.daily_trend * h as f64, var * h as f64);
        }
        Ok(out)
    }
}
