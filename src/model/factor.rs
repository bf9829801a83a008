use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::factor::ForecasterSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorCategory {
    International,
    Fx,
    Policy,
    SupplyDemand,
    Economic,
    Distribution,
    Seasonal,
}

impl FactorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::International => "international",
            Self::Fx => "fx",
            Self::Policy => "policy",
            Self::SupplyDemand => "supply_demand",
            Self::Economic => "economic",
            Self::Distribution => "distribution",
            Self::Seasonal => "seasonal",
        }
    }
}

/// One predictive driver of the retail price and the model that projects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factor {
    pub id: String,
    pub category: FactorCategory,
    pub static_weight: f64,
    /// Fractional price effect of a unit relative change in the factor.
    #[serde(default = "default_pass_through")]
    pub pass_through: f64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
    #[serde(default = "default_active")]
    pub active: bool,
    pub forecaster: ForecasterSpec,
}

fn default_pass_through() -> f64 {
    1.0
}

fn default_lookback_days() -> usize {
    90
}

fn default_active() -> bool {
    true
}

/// One forecast day of one factor, as emitted by its forecaster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorObservation {
    pub factor_id: String,
    pub as_of: NaiveDate,
    pub day_offset: usize,
    /// Projected relative change of the factor itself.
    pub value: f64,
    /// Fractional price effect attributed to this factor.
    pub impact: f64,
    pub variance: f64,
    pub degraded: bool,
}
