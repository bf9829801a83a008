use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::model::fuel::FuelProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Overrides `fuel.weekly_volatility / 7` when set.
    pub daily_limit: Option<f64>,
    /// Growth of the cumulative bound per day; defaults to the daily limit.
    pub cumulative_daily_growth: Option<f64>,
    pub annual_max_change: f64,
    pub absolute_lower_ratio: f64,
    pub absolute_upper_ratio: f64,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            daily_limit: None,
            cumulative_daily_growth: None,
            annual_max_change: 0.15,
            absolute_lower_ratio: 0.5,
            absolute_upper_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampKind {
    Daily,
    Cumulative,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClampEvent {
    pub day_offset: usize,
    pub kind: ClampKind,
    pub proposed: f64,
    pub clamped: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedPath {
    pub prices: Vec<f64>,
    pub events: Vec<ClampEvent>,
}

/// Limits resolved for one fuel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintEnforcer {
    pub daily_limit: f64,
    pub cumulative_daily_growth: f64,
    pub annual_max_change: f64,
    pub lower_ratio: f64,
    pub upper_ratio: f64,
}

impl ConstraintEnforcer {
    pub fn for_fuel(cfg: &ConstraintConfig, fuel: &FuelProfile) -> Self {
        let daily_limit = cfg
            .daily_limit
            .unwrap_or_else(|| fuel.daily_volatility_limit())
            .max(0.0);
        Self {
            daily_limit,
            cumulative_daily_growth: cfg.cumulative_daily_growth.unwrap_or(daily_limit).max(0.0),
            annual_max_change: cfg.annual_max_change.max(0.0),
            lower_ratio: cfg.absolute_lower_ratio,
            upper_ratio: cfg.absolute_upper_ratio,
        }
    }

    pub fn cumulative_limit(&self, day_offset: usize) -> f64 {
        (day_offset as f64 * self.cumulative_daily_growth).min(self.annual_max_change)
    }

    /// Walk the path day by day. Each day's bound is measured against the
    /// previous day's clamped price, so clamps compound.
    pub fn enforce(
        &self,
        region: &str,
        anchor: f64,
        proposed: &[f64],
    ) -> ForecastResult<ConstrainedPath> {
        if !anchor.is_finite() || anchor <= 0.0 {
            return Err(ForecastError::ConstraintViolationExhausted {
                region: region.to_string(),
                day: 0,
                reason: format!("invalid anchor price {anchor}"),
            });
        }
        let lower = anchor * self.lower_ratio;
        let upper = anchor * self.upper_ratio;

        let (prices, events) = proposed.iter().enumerate().try_fold(
            (Vec::with_capacity(proposed.len()), Vec::new()),
            |(mut prices, mut events), (i, raw)| {
                let day = i + 1;
                if !raw.is_finite() {
                    return Err(ForecastError::ConstraintViolationExhausted {
                        region: region.to_string(),
                        day,
                        reason: "non-finite proposed price".to_string(),
                    });
                }
                let prev = prices.last().copied().unwrap_or(anchor);
                let mut price = *raw;

                let max_step = prev * self.daily_limit;
                if (price - prev).abs() > max_step {
                    let clamped = if price > prev { prev + max_step } else { prev - max_step };
                    events.push(ClampEvent {
                        day_offset: day,
                        kind: ClampKind::Daily,
                        proposed: price,
                        clamped,
                    });
                    price = clamped;
                }

                let max_cum = anchor * self.cumulative_limit(day);
                if (price - anchor).abs() > max_cum {
                    let clamped = if price > anchor { anchor + max_cum } else { anchor - max_cum };
                    events.push(ClampEvent {
                        day_offset: day,
                        kind: ClampKind::Cumulative,
                        proposed: price,
                        clamped,
                    });
                    price = clamped;
                }

                if price < lower || price > upper {
                    let clamped = price.clamp(lower, upper);
                    events.push(ClampEvent {
                        day_offset: day,
                        kind: ClampKind::Absolute,
                        proposed: price,
                        clamped,
                    });
                    price = clamped;
                }

                if !price.is_finite() {
                    return Err(ForecastError::ConstraintViolationExhausted {
                        region: region.to_string(),
                        day,
                        reason: "clamp produced a non-finite price".to_string(),
                    });
                }
                prices.push(price);
                Ok((prices, events))
            },
        )?;

        for e in &events {
            tracing::debug!(
                region = %region,
                day = e.day_offset,
                kind = ?e.kind,
                proposed = e.proposed,
                clamped = e.clamped,
                "price clamped"
            );
        }
        Ok(ConstrainedPath { prices, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fuel::default_fuel_profiles;

    fn enforcer(daily: f64) -> ConstraintEnforcer {
        ConstraintEnforcer::for_fuel(
            &ConstraintConfig {
                daily_limit: Some(daily),
                ..ConstraintConfig::default()
            },
            &default_fuel_profiles()[0],
        )
    }

    #[test]
    fn clamps_compound_from_previous_day() {
        let out = enforcer(0.01).enforce("seoul", 1000.0, &[1100.0, 1100.0, 1100.0]).unwrap();
        assert!((out.prices[0] - 1010.0).abs() < 1e-9);
        // Day 2 clears the daily bound at 1020.1 but the cumulative bound is 2%.
        assert!((out.prices[1] - 1020.0).abs() < 1e-9);
        assert!((out.prices[2] - 1030.0).abs() < 1e-9);
        assert!(out
            .events
            .iter()
            .any(|e| e.kind == ClampKind::Cumulative && e.day_offset == 2));
    }

    #[test]
    fn nan_aborts_instead_of_emitting() {
        let err = enforcer(0.01).enforce("seoul", 1000.0, &[1000.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, ForecastError::ConstraintViolationExhausted { day: 2, .. }));
    }

    #[test]
    fn absolute_bound_is_final_safety_net() {
        let loose = ConstraintEnforcer {
            daily_limit: 10.0,
            cumulative_daily_growth: 10.0,
            annual_max_change: 10.0,
            lower_ratio: 0.5,
            upper_ratio: 1.5,
        };
        let out = loose.enforce("jeju", 1000.0, &[3000.0, 100.0]).unwrap();
        assert_eq!(out.prices, vec![1500.0, 500.0]);
    }

    #[test]
    fn default_daily_limit_comes_from_fuel() {
        let diesel = &default_fuel_profiles()[1];
        let e = ConstraintEnforcer::for_fuel(&ConstraintConfig::default(), diesel);
        assert!((e.daily_limit - 0.006).abs() < 1e-12);
        assert!((e.cumulative_limit(1000) - 0.15).abs() < 1e-12);
    }
}
