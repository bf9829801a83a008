use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Immutable, normalized factor weights published by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSet {
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
    pub weights: BTreeMap<String, f64>,
}

impl WeightSet {
    pub fn get(&self, factor_id: &str) -> f64 {
        self.weights.get(factor_id).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE
    }
}

/// Scale `raw` to sum to one. Whatever floating residual remains is added to the
/// largest weight (first by id on ties).
pub fn normalize_weights(raw: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = raw.values().map(|w| w.max(0.0)).sum();
    if raw.is_empty() {
        return BTreeMap::new();
    }
    let mut out: BTreeMap<String, f64> = if total <= f64::EPSILON {
        let even = 1.0 / raw.len() as f64;
        raw.keys().map(|k| (k.clone(), even)).collect()
    } else {
        raw.iter()
            .map(|(k, w)| (k.clone(), w.max(0.0) / total))
            .collect()
    };
    let residual = 1.0 - out.values().sum::<f64>();
    let largest = out
        .iter()
        .fold(None::<(&String, f64)>, |best, (k, w)| match best {
            Some((_, bw)) if bw >= *w => best,
            _ => Some((k, *w)),
        })
        .map(|(k, _)| k.clone());
    if let Some(key) = largest {
        if let Some(w) = out.get_mut(&key) {
            *w += residual;
        }
    }
    out
}

/// Holds static baselines and publishes copy-on-write `WeightSet` snapshots.
///
/// Readers call [`WeightRegistry::snapshot`] once at the start of a run and keep
/// the `Arc` for its whole duration; publishing swaps in a new generation
/// without touching snapshots already handed out.
#[derive(Debug)]
pub struct WeightRegistry {
    static_weights: BTreeMap<String, f64>,
    momentum: f64,
    current: ArcSwap<WeightSet>,
}

impl WeightRegistry {
    pub fn new(static_weights: BTreeMap<String, f64>, momentum: f64) -> ForecastResult<Self> {
        validate_static_weights(&static_weights)?;
        if !(0.0..=1.0).contains(&momentum) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "momentum {momentum} outside [0, 1]"
            )));
        }
        let initial = WeightSet {
            generation: 0,
            generated_at: Utc::now(),
            weights: normalize_weights(&static_weights),
        };
        Ok(Self {
            static_weights,
            momentum,
            current: ArcSwap::from_pointee(initial),
        })
    }

    pub fn static_weights(&self) -> &BTreeMap<String, f64> {
        &self.static_weights
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn snapshot(&self) -> Arc<WeightSet> {
        self.current.load_full()
    }

    /// Dynamic component from per-factor scores (`1 / (1 + MAPE)`).
    ///
    /// Factors without accuracy history keep their static weight; the factors
    /// that do have history split their combined static mass by score.
    pub fn dynamic_weights(&self, scores: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let scored_mass: f64 = self
            .static_weights
            .iter()
            .filter(|(id, _)| scores.contains_key(*id))
            .map(|(_, w)| *w)
            .sum();
        let score_total: f64 = self
            .static_weights
            .keys()
            .filter_map(|id| scores.get(id))
            .map(|s| s.max(0.0))
            .sum();
        self.static_weights
            .iter()
            .map(|(id, w)| {
                let dynamic = match scores.get(id) {
                    Some(s) if score_total > f64::EPSILON => scored_mass * s.max(0.0) / score_total,
                    Some(_) => *w,
                    None => *w,
                };
                (id.clone(), dynamic)
            })
            .collect()
    }

    /// `λ·static + (1 − λ)·dynamic`, normalized.
    pub fn effective_weights(&self, scores: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let dynamic = self.dynamic_weights(scores);
        let blended: BTreeMap<String, f64> = self
            .static_weights
            .iter()
            .map(|(id, w)| {
                let d = dynamic.get(id).copied().unwrap_or(*w);
                (id.clone(), self.momentum * w + (1.0 - self.momentum) * d)
            })
            .collect();
        normalize_weights(&blended)
    }

    /// Recompute weights from fresh scores and publish them as the next generation.
    pub fn publish(&self, scores: &BTreeMap<String, f64>) -> Arc<WeightSet> {
        let weights = self.effective_weights(scores);
        let generated_at = Utc::now();
        self.current.rcu(|cur| WeightSet {
            generation: cur.generation + 1,
            generated_at,
            weights: weights.clone(),
        });
        let published = self.snapshot();
        tracing::info!(
            generation = published.generation,
            scored = scores.len(),
            "weight set published"
        );
        published
    }

    /// Reinstate a persisted snapshot. Factors unknown to the registry are
    /// dropped and the result is renormalized.
    pub fn restore(&self, set: &WeightSet) -> Arc<WeightSet> {
        let known: BTreeMap<String, f64> = self
            .static_weights
            .keys()
            .map(|id| (id.clone(), set.get(id)))
            .collect();
        let restored = WeightSet {
            generation: set.generation,
            generated_at: set.generated_at,
            weights: normalize_weights(&known),
        };
        self.current.store(Arc::new(restored));
        self.snapshot()
    }
}

pub fn validate_static_weights(weights: &BTreeMap<String, f64>) -> ForecastResult<()> {
    if weights.is_empty() {
        return Err(ForecastError::NoActiveFactors);
    }
    if let Some((id, w)) = weights
        .iter()
        .find(|(_, w)| !w.is_finite() || !(0.0..=1.0).contains(*w))
    {
        return Err(ForecastError::InvalidConfiguration(format!(
            "static weight of {id} is {w}, expected [0, 1]"
        )));
    }
    let total: f64 = weights.values().sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ForecastError::InvalidConfiguration(format!(
            "static weights sum to {total:.6}, expected 1.0"
        )));
    }
    Ok(())
}
