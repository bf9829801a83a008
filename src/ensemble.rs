use std::collections::BTreeMap;

use serde::Serialize;

use crate::factor::FactorPrediction;
use crate::model::factor::FactorCategory;
use crate::model::fuel::FuelProfile;
use crate::weights::WeightSet;

/// One factor's forecaster output as it enters the combiner.
#[derive(Debug, Clone)]
pub struct FactorOutput {
    pub factor_id: String,
    pub category: FactorCategory,
    pub prediction: FactorPrediction,
}

/// Raw national combination for one fuel, before any regional treatment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleOutput {
    pub weight_generation: u64,
    /// Combined fractional delta `Δ(t)` per horizon day, fuel sensitivity applied.
    pub deltas: Vec<f64>,
    /// Part of `deltas` coming from seasonal-category factors.
    pub seasonal: Vec<f64>,
    /// `Σ w_i² · var_i(t)` on the same scale as `deltas`.
    pub variances: Vec<f64>,
    /// Weighted contribution `c_i(t)` of each factor; sums to `deltas`.
    pub contributions: BTreeMap<String, Vec<f64>>,
    pub degraded: Vec<String>,
}

impl EnsembleOutput {
    pub fn horizon(&self) -> usize {
        self.deltas.len()
    }

    pub fn sigma(&self, day_index: usize) -> f64 {
        self.variances
            .get(day_index)
            .map(|v| v.max(0.0).sqrt())
            .unwrap_or(0.0)
    }

    pub fn national_prices(&self, current_price: f64) -> Vec<f64> {
        self.deltas
            .iter()
            .map(|d| current_price * (1.0 + d))
            .collect()
    }
}

/// Weighted sum of factor impacts. A pure function of its inputs: iteration is
/// over the ordered `outputs` map, so repeated calls are bit-identical.
pub fn combine(
    weights: &WeightSet,
    outputs: &BTreeMap<String, FactorOutput>,
    fuel: &FuelProfile,
    horizon: usize,
) -> EnsembleOutput {
    let sensitivity = fuel.international_sensitivity;
    let mut deltas = vec![0.0; horizon];
    let mut seasonal = vec![0.0; horizon];
    let mut variances = vec![0.0; horizon];
    let mut contributions = BTreeMap::new();
    let mut degraded = Vec::new();

    for (id, output) in outputs {
        let w = weights.get(id);
        let prediction = &output.prediction;
        if prediction.is_degraded() {
            degraded.push(id.clone());
        }
        let mut series = vec![0.0; horizon];
        for t in 0..horizon {
            let impact = if prediction.is_degraded() {
                0.0
            } else {
                prediction.impacts.get(t).copied().unwrap_or(0.0)
            };
            let variance = prediction.variances.get(t).copied().unwrap_or(0.0).max(0.0);
            let c = w * impact * sensitivity;
            series[t] = c;
            deltas[t] += c;
            if output.category == FactorCategory::Seasonal {
                seasonal[t] += c;
            }
            variances[t] += w * w * variance * sensitivity * sensitivity;
        }
        contributions.insert(id.clone(), series);
    }

    EnsembleOutput {
        weight_generation: weights.generation,
        deltas,
        seasonal,
        variances,
        contributions,
        degraded,
    }
}
