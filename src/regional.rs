use serde::{Deserialize, Serialize};

use crate::ensemble::EnsembleOutput;
use crate::model::fuel::FuelProfile;
use crate::model::region::RegionProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionalConfig {
    pub k_infra: f64,
    pub k_competition: f64,
    /// Seasonal amplification per unit of infrastructure premium.
    pub k1: f64,
    /// Seasonal amplification per unit of competition premium.
    pub k2: f64,
}

impl Default for RegionalConfig {
    fn default() -> Self {
        Self {
            k_infra: 0.01,
            k_competition: 0.005,
            k1: 20.0,
            k2: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionalCoefficients {
    pub premium: f64,
    pub infra: f64,
    pub competition: f64,
}

impl RegionalCoefficients {
    pub fn total(&self) -> f64 {
        self.premium + self.infra + self.competition
    }
}

/// Unconstrained regional path plus the relative sigma the interval stage needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionalPath {
    pub region: String,
    pub anchor: f64,
    pub deltas: Vec<f64>,
    pub prices: Vec<f64>,
    /// Regional relative standard deviation per day.
    pub sigmas: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionalAdjuster {
    cfg: RegionalConfig,
}

impl RegionalAdjuster {
    pub fn new(cfg: RegionalConfig) -> Self {
        Self { cfg }
    }

    pub fn coefficients(&self, region: &RegionProfile, fuel: &FuelProfile) -> RegionalCoefficients {
        RegionalCoefficients {
            premium: region.premium_coefficient * fuel.price_sensitivity,
            infra: (1.0 - region.infrastructure_score) * self.cfg.k_infra,
            competition: (1.0 - region.competition_index) * self.cfg.k_competition,
        }
    }

    /// Multiplier on the seasonal contribution for this region and fuel.
    pub fn seasonal_amplification(&self, coef: &RegionalCoefficients, fuel: &FuelProfile) -> f64 {
        (1.0 + coef.infra * self.cfg.k1 + coef.competition * self.cfg.k2)
            * fuel.seasonal_sensitivity
    }

    pub fn volatility_scale(&self, region: &RegionProfile, fuel: &FuelProfile) -> f64 {
        (1.0 + (region.volatility_factor - 1.0) * fuel.volatility_sensitivity).max(0.0)
    }

    /// Day-0 anchor: the observed regional price when known, else the national
    /// price carried over with the structural regional premium.
    pub fn anchor(
        &self,
        region: &RegionProfile,
        fuel: &FuelProfile,
        national_current: f64,
        regional_current: Option<f64>,
    ) -> f64 {
        match regional_current {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => national_current * (1.0 + self.coefficients(region, fuel).total()),
        }
    }

    pub fn adjust(
        &self,
        ensemble: &EnsembleOutput,
        region: &RegionProfile,
        fuel: &FuelProfile,
        anchor: f64,
    ) -> RegionalPath {
        let coef = self.coefficients(region, fuel);
        let amp = self.seasonal_amplification(&coef, fuel);
        let vol = self.volatility_scale(region, fuel);
        let deltas: Vec<f64> = ensemble
            .deltas
            .iter()
            .zip(&ensemble.seasonal)
            .map(|(d, s)| d - s + s * amp)
            .collect();
        let prices = deltas.iter().map(|d| anchor * (1.0 + d)).collect();
        let sigmas = (0..ensemble.horizon())
            .map(|t| ensemble.sigma(t) * vol)
            .collect();
        RegionalPath {
            region: region.code.clone(),
            anchor,
            deltas,
            prices,
            sigmas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fuel::default_fuel_profiles;
    use crate::model::region::default_region_profiles;

    #[test]
    fn seoul_gasoline_coefficients() {
        let adjuster = RegionalAdjuster::default();
        let seoul = &default_region_profiles()[0];
        let gasoline = &default_fuel_profiles()[0];
        let c = adjuster.coefficients(seoul, gasoline);
        assert!((c.premium - 0.02).abs() < 1e-12);
        assert!(c.infra.abs() < 1e-12);
        assert!((c.competition - 0.0005).abs() < 1e-12);
        assert!((adjuster.seasonal_amplification(&c, gasoline) - 1.01).abs() < 1e-12);
    }

    #[test]
    fn diesel_amplifies_volatility_more() {
        let adjuster = RegionalAdjuster::default();
        let jeju = default_region_profiles().into_iter().find(|r| r.code == "jeju").unwrap();
        let profiles = default_fuel_profiles();
        let g = adjuster.volatility_scale(&jeju, &profiles[0]);
        let d = adjuster.volatility_scale(&jeju, &profiles[1]);
        assert!((g - 1.25).abs() < 1e-12);
        assert!((d - 1.3).abs() < 1e-12);
    }
}
