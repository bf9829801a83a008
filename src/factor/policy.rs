use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

/// An announced change to the factor level, effective from `effective` onwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPolicyChange {
    pub effective: NaiveDate,
    pub relative_change: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRuleConfig {
    pub scheduled: Vec<ScheduledPolicyChange>,
    /// A day-over-day move larger than this counts as a policy step.
    pub step_threshold: f64,
    /// Days after a step during which a follow-up adjustment is considered likely.
    pub review_window_days: i64,
    pub base_variance: f64,
    pub review_variance: f64,
}

impl Default for PolicyRuleConfig {
    fn default() -> Self {
        Self {
            scheduled: Vec::new(),
            step_threshold: 0.005,
            review_window_days: 30,
            base_variance: 1e-8,
            review_variance: 2e-6,
        }
    }
}

/// Piecewise-constant administered level: flat unless a change is scheduled.
#[derive(Debug, Clone, Default)]
pub struct PolicyRuleForecaster {
    cfg: PolicyRuleConfig,
}

impl PolicyRuleForecaster {
    pub fn new(cfg: PolicyRuleConfig) -> Self {
        Self { cfg }
    }

    /// Date of the most recent level step in the window, if any.
    pub fn last_step(&self, window: &HistoryWindow) -> Option<NaiveDate> {
        window
            .points
            .windows(2)
            .rev()
            .find(|w| {
                w[0].value.abs() > f64::EPSILON
                    && ((w[1].value - w[0].value) / w[0].value).abs() > self.cfg.step_threshold
            })
            .map(|w| w[1].date)
    }
}

impl FactorForecaster for PolicyRuleForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::PolicyRule
    }

    fn min_history(&self) -> usize {
        1
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        require_last(&window.values())?;
        let under_review = self
            .last_step(window)
            .map(|d| (ctx.as_of - d).num_days() <= self.cfg.review_window_days)
            .unwrap_or(false);
        let daily_var = self.cfg.base_variance
            + if under_review {
                self.cfg.review_variance
            } else {
                0.0
            };

        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            let date = ctx.date_at(h);
            let level = self
                .cfg
                .scheduled
                .iter()
                .filter(|c| c.effective > ctx.as_of && c.effective <= date)
                .fold(1.0, |acc, c| acc * (1.0 + c.relative_change));
            out.push(level - 1.0, daily_var * h as f64);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fuel::default_fuel_profiles;

    fn ctx() -> ForecastContext {
        ForecastContext {
            as_of: NaiveDate::from_ymd_opt(2025, 6, 28).unwrap(),
            horizon: 7,
            fuel: default_fuel_profiles()[0].clone(),
            pass_through: 1.0,
            degraded_variance: 1e-4,
        }
    }

    #[test]
    fn scheduled_change_applies_from_effective_date() {
        let fc = PolicyRuleForecaster::new(PolicyRuleConfig {
            scheduled: vec![ScheduledPolicyChange {
                effective: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                relative_change: 0.05,
            }],
            ..PolicyRuleConfig::default()
        });
        let window = HistoryWindow::from_values("fuel_tax", ctx().as_of, &[820.0; 10]);
        let pred = fc.predict(&window, &ctx());
        assert_eq!(pred.impacts[1], 0.0);
        assert!((pred.impacts[2] - 0.05).abs() < 1e-12);
        assert!((pred.impacts[6] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn recent_step_raises_variance() {
        let fc = PolicyRuleForecaster::default();
        let flat = HistoryWindow::from_values("fuel_tax", ctx().as_of, &[820.0; 10]);
        let mut stepped_values = vec![780.0; 5];
        stepped_values.extend([820.0; 5]);
        let stepped = HistoryWindow::from_values("fuel_tax", ctx().as_of, &stepped_values);
        assert!(fc.last_step(&flat).is_none());
        assert!(fc.last_step(&stepped).is_some());
        let a = fc.predict(&flat, &ctx());
        let b = fc.predict(&stepped, &ctx());
        assert!(b.variances[0] > a.variances[0]);
    }
}
