use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::fuel::FuelType;

use super::{
    FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow, Projection,
};

const GASOLINE_MONTHLY: [f64; 12] = [
    -0.3, -0.5, -0.1, 0.1, 0.3, 0.5, 0.8, 0.6, 0.3, 0.0, -0.2, -0.3,
];
const DIESEL_MONTHLY: [f64; 12] = [
    0.5, 0.3, 0.1, -0.1, -0.3, -0.5, -0.7, -0.5, -0.2, 0.1, 0.3, 0.5,
];
/// Monday first.
const WEEKDAY_EFFECT: [f64; 7] = [1.02, 1.00, 0.98, 0.99, 1.01, 1.03, 1.02];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSeasonalConfig {
    /// Price effect of a weekday multiplier one unit away from 1.0.
    pub weekday_scale: f64,
    pub daily_variance: f64,
}

impl Default for CalendarSeasonalConfig {
    fn default() -> Self {
        Self {
            weekday_scale: 0.002,
            daily_variance: 1e-8,
        }
    }
}

/// Deterministic month-of-year and day-of-week profile. Needs no history.
#[derive(Debug, Clone, Default)]
pub struct CalendarSeasonalForecaster {
    cfg: CalendarSeasonalConfig,
}

impl CalendarSeasonalForecaster {
    pub fn new(cfg: CalendarSeasonalConfig) -> Self {
        Self { cfg }
    }

    /// Fractional level of the seasonal cycle on `date`.
    pub fn level(&self, fuel: FuelType, amplitude: f64, date: NaiveDate) -> f64 {
        let monthly = match fuel {
            FuelType::Gasoline => GASOLINE_MONTHLY,
            FuelType::Diesel => DIESEL_MONTHLY,
        };
        let month = monthly[date.month0() as usize] * amplitude;
        let weekday = WEEKDAY_EFFECT[date.weekday().num_days_from_monday() as usize];
        month + (weekday - 1.0) * self.cfg.weekday_scale
    }
}

impl FactorForecaster for CalendarSeasonalForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::CalendarSeasonal
    }

    fn min_history(&self) -> usize {
        0
    }

    fn project(
        &self,
        _window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let fuel = ctx.fuel.fuel;
        let amplitude = ctx.fuel.seasonal_amplitude;
        let today = self.level(fuel, amplitude, ctx.as_of);
        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            let level = self.level(fuel, amplitude, ctx.date_at(h));
            out.push(level - today, self.cfg.daily_variance * h as f64);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fuel::default_fuel_profiles;

    #[test]
    fn summer_peak_for_gasoline_and_winter_peak_for_diesel() {
        let fc = CalendarSeasonalForecaster::default();
        let july = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let january = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let gasoline = |d| fc.level(FuelType::Gasoline, 0.003, d);
        let diesel = |d| fc.level(FuelType::Diesel, 0.003, d);
        assert!(gasoline(july) > gasoline(january));
        assert!(diesel(january) > diesel(july));
    }

    #[test]
    fn works_with_empty_history() {
        let ctx = ForecastContext {
            as_of: NaiveDate::from_ymd_opt(2025, 6, 28).unwrap(),
            horizon: 7,
            fuel: default_fuel_profiles()[0].clone(),
            pass_through: 1.0,
            degraded_variance: 1e-4,
        };
        let pred = CalendarSeasonalForecaster::default().predict(&HistoryWindow::default(), &ctx);
        assert!(!pred.is_degraded());
        // Crossing into July raises the gasoline level.
        assert!(pred.impacts[6] > 0.0);
    }
}
