use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    /// Light distillate (regular unleaded).
    Gasoline,
    /// Middle distillate (automotive diesel).
    Diesel,
}

impl FuelType {
    pub const ALL: [FuelType; 2] = [FuelType::Gasoline, FuelType::Diesel];

    pub fn as_str(&self) -> &'static str {
        match self {
            FuelType::Gasoline => "gasoline",
            FuelType::Diesel => "diesel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gasoline" | "light_distillate" => Some(FuelType::Gasoline),
            "diesel" | "middle_distillate" => Some(FuelType::Diesel),
            _ => None,
        }
    }

    pub fn is_middle_distillate(&self) -> bool {
        matches!(self, FuelType::Diesel)
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelProfile {
    pub fuel: FuelType,
    /// Largest plausible relative move over seven days.
    pub weekly_volatility: f64,
    /// Peak fractional amplitude of the calendar seasonal cycle.
    pub seasonal_amplitude: f64,
    /// Multiplier on the combined ensemble delta (1.0 for the light distillate).
    pub international_sensitivity: f64,
    /// Price elasticity of demand; negative for normal goods.
    pub demand_elasticity: f64,
    /// Scales the regional premium coefficient.
    #[serde(default = "one")]
    pub price_sensitivity: f64,
    /// Scales the regional volatility factor.
    #[serde(default = "one")]
    pub volatility_sensitivity: f64,
    /// Scales the regional seasonal amplification.
    #[serde(default = "one")]
    pub seasonal_sensitivity: f64,
}

fn one() -> f64 {
    1.0
}

impl FuelProfile {
    pub fn daily_volatility_limit(&self) -> f64 {
        self.weekly_volatility.max(0.0) / 7.0
    }
}

pub fn default_fuel_profiles() -> Vec<FuelProfile> {
    vec![
        FuelProfile {
            fuel: FuelType::Gasoline,
            weekly_volatility: 0.035,
            seasonal_amplitude: 0.003,
            international_sensitivity: 1.0,
            demand_elasticity: -0.25,
            price_sensitivity: 1.0,
            volatility_sensitivity: 1.0,
            seasonal_sensitivity: 1.0,
        },
        FuelProfile {
            fuel: FuelType::Diesel,
            weekly_volatility: 0.042,
            seasonal_amplitude: 0.0035,
            international_sensitivity: 1.1,
            demand_elasticity: -0.15,
            price_sensitivity: 0.8,
            volatility_sensitivity: 1.2,
            seasonal_sensitivity: 1.1,
        },
    ]
}
