use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::factor::{Factor, FactorCategory, FactorObservation};
use crate::model::fuel::FuelProfile;

pub mod calendar;
pub mod constant;
pub mod ecm;
pub mod garch;
pub mod growth;
pub mod hybrid;
pub mod margin;
pub mod network;
pub mod numerics;
pub mod policy;
pub mod ridge;
pub mod seasonal;
pub mod spatial;
pub mod var;

pub use calendar::{CalendarSeasonalConfig, CalendarSeasonalForecaster};
pub use constant::{ConstantTrendConfig, ConstantTrendForecaster};
pub use ecm::{ErrorCorrectionConfig, ErrorCorrectionForecaster};
pub use garch::{GarchConfig, GarchForecaster};
pub use growth::{SaturatingGrowthConfig, SaturatingGrowthForecaster};
pub use hybrid::{ArHoltHybridConfig, ArHoltHybridForecaster};
pub use margin::{MarginEquilibriumConfig, MarginEquilibriumForecaster};
pub use network::{NetworkCostConfig, NetworkCostForecaster, NetworkEdge};
pub use policy::{PolicyRuleConfig, PolicyRuleForecaster, ScheduledPolicyChange};
pub use ridge::{
    PolynomialRidgeConfig, PolynomialRidgeForecaster, RidgeRegressionConfig,
    RidgeRegressionForecaster,
};
pub use seasonal::{
    SeasonalInventoryConfig, SeasonalInventoryForecaster, SeasonalRegressionConfig,
    SeasonalRegressionForecaster,
};
pub use spatial::{SpatialHierarchicalConfig, SpatialHierarchicalForecaster};
pub use var::{VectorAutoregressionConfig, VectorAutoregressionForecaster};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Lookback window handed to one forecaster. Companion series are tail-aligned
/// with `points` (their last element is the same day as the last point).
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    pub factor_id: String,
    pub points: Vec<HistoryPoint>,
    pub companions: BTreeMap<String, Vec<f64>>,
}

impl HistoryWindow {
    pub fn new(factor_id: impl Into<String>, points: Vec<HistoryPoint>) -> Self {
        Self {
            factor_id: factor_id.into(),
            points,
            companions: BTreeMap::new(),
        }
    }

    /// Daily series ending on `last_date`, one point per day.
    pub fn from_values(factor_id: impl Into<String>, last_date: NaiveDate, values: &[f64]) -> Self {
        let n = values.len() as i64;
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| HistoryPoint {
                date: last_date - chrono::Duration::days(n - 1 - i as i64),
                value: *v,
            })
            .collect();
        Self::new(factor_id, points)
    }

    pub fn with_companion(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.companions.insert(name.into(), values);
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn companion(&self, name: &str) -> Option<&[f64]> {
        self.companions.get(name).map(Vec::as_slice)
    }

    /// Keep only the most recent `lookback` points (and matching companion tails).
    pub fn truncated(mut self, lookback: usize) -> Self {
        if lookback > 0 && self.points.len() > lookback {
            let drop = self.points.len() - lookback;
            self.points.drain(..drop);
        }
        for series in self.companions.values_mut() {
            if lookback > 0 && series.len() > lookback {
                let drop = series.len() - lookback;
                series.drain(..drop);
            }
        }
        self
    }
}

/// Per-run inputs that are not part of the factor's own history.
#[derive(Debug, Clone)]
pub struct ForecastContext {
    pub as_of: NaiveDate,
    pub horizon: usize,
    pub fuel: FuelProfile,
    pub pass_through: f64,
    /// Per-day variance assigned to a degraded factor.
    pub degraded_variance: f64,
}

impl ForecastContext {
    pub fn date_at(&self, day_offset: usize) -> NaiveDate {
        self.as_of + chrono::Duration::days(day_offset as i64)
    }

    pub fn day_of_year_at(&self, day_offset: usize) -> u32 {
        self.date_at(day_offset).ordinal()
    }
}

/// Projected relative change of a factor's level versus its last observation,
/// for days `1..=horizon`, with the variance of that change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub changes: Vec<f64>,
    pub variances: Vec<f64>,
}

impl Projection {
    pub fn with_capacity(horizon: usize) -> Self {
        Self {
            changes: Vec::with_capacity(horizon),
            variances: Vec::with_capacity(horizon),
        }
    }

    pub fn push(&mut self, change: f64, variance: f64) {
        self.changes.push(change);
        self.variances.push(variance.max(0.0));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactorFailure {
    InsufficientHistory { required: usize, available: usize },
    Unavailable(String),
    Numerical(String),
    TimedOut { after_ms: u64 },
}

impl fmt::Display for FactorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory {
                required,
                available,
            } => write!(f, "insufficient history: {available} < {required}"),
            Self::Unavailable(msg) => write!(f, "data unavailable: {msg}"),
            Self::Numerical(msg) => write!(f, "numerical failure: {msg}"),
            Self::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionStatus {
    Ok,
    Degraded(FactorFailure),
}

/// Output of the forecaster contract: one `(impact, variance)` pair per horizon day.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorPrediction {
    pub values: Vec<f64>,
    pub impacts: Vec<f64>,
    pub variances: Vec<f64>,
    pub status: PredictionStatus,
}

impl FactorPrediction {
    /// Neutral placeholder: zero impact, variance growing linearly with the day offset.
    pub fn degraded(ctx: &ForecastContext, failure: FactorFailure) -> Self {
        let base = ctx.degraded_variance.max(0.0);
        Self {
            values: vec![0.0; ctx.horizon],
            impacts: vec![0.0; ctx.horizon],
            variances: (1..=ctx.horizon).map(|t| base * t as f64).collect(),
            status: PredictionStatus::Degraded(failure),
        }
    }

    pub fn from_projection(ctx: &ForecastContext, projection: Projection) -> Self {
        let k = ctx.pass_through;
        Self {
            impacts: projection.changes.iter().map(|c| c * k).collect(),
            variances: projection.variances.iter().map(|v| v * k * k).collect(),
            values: projection.changes,
            status: PredictionStatus::Ok,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, PredictionStatus::Degraded(_))
    }

    pub fn horizon(&self) -> usize {
        self.impacts.len()
    }

    pub fn into_observations(self, factor_id: &str, as_of: NaiveDate) -> Vec<FactorObservation> {
        let degraded = self.is_degraded();
        self.values
            .into_iter()
            .zip(self.impacts)
            .zip(self.variances)
            .enumerate()
            .map(|(i, ((value, impact), variance))| FactorObservation {
                factor_id: factor_id.to_string(),
                as_of,
                day_offset: i + 1,
                value,
                impact,
                variance,
                degraded,
            })
            .collect()
    }
}

/// Contract every factor model satisfies to take part in the ensemble.
///
/// Implementors provide `project`; `predict` wraps it so that any failure,
/// short history or non-finite output turns into a degraded prediction
/// instead of an error.
pub trait FactorForecaster: Send + Sync + fmt::Debug {
    fn method(&self) -> ForecastMethod;

    fn min_history(&self) -> usize {
        2
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure>;

    fn predict(&self, window: &HistoryWindow, ctx: &ForecastContext) -> FactorPrediction {
        if window.len() < self.min_history() {
            return FactorPrediction::degraded(
                ctx,
                FactorFailure::InsufficientHistory {
                    required: self.min_history(),
                    available: window.len(),
                },
            );
        }
        match self.project(window, ctx) {
            Ok(projection) => match validate_projection(&projection, ctx.horizon) {
                Ok(()) => FactorPrediction::from_projection(ctx, projection),
                Err(failure) => FactorPrediction::degraded(ctx, failure),
            },
            Err(failure) => FactorPrediction::degraded(ctx, failure),
        }
    }
}

fn validate_projection(projection: &Projection, horizon: usize) -> Result<(), FactorFailure> {
    if projection.changes.len() != horizon || projection.variances.len() != horizon {
        return Err(FactorFailure::Numerical(format!(
            "expected {} days, got {}",
            horizon,
            projection.changes.len()
        )));
    }
    let finite = projection
        .changes
        .iter()
        .chain(&projection.variances)
        .all(|v| v.is_finite());
    if !finite {
        return Err(FactorFailure::Numerical("non-finite projection".to_string()));
    }
    if projection.variances.iter().any(|v| *v < 0.0) {
        return Err(FactorFailure::Numerical("negative variance".to_string()));
    }
    Ok(())
}

pub(crate) fn require_last(values: &[f64]) -> Result<f64, FactorFailure> {
    match values.last() {
        Some(v) if v.is_finite() && *v > f64::EPSILON => Ok(*v),
        _ => Err(FactorFailure::Unavailable(
            "last observation missing or non-positive".to_string(),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastMethod {
    ArHoltHybrid,
    VectorAutoregression,
    Garch,
    PolicyRule,
    RidgeRegression,
    SeasonalInventory,
    SeasonalRegression,
    SpatialHierarchical,
    ErrorCorrection,
    PolynomialRidge,
    SaturatingGrowth,
    MarginEquilibrium,
    NetworkCost,
    CalendarSeasonal,
    ConstantTrend,
}

impl ForecastMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArHoltHybrid => "ar_holt_hybrid",
            Self::VectorAutoregression => "vector_autoregression",
            Self::Garch => "garch",
            Self::PolicyRule => "policy_rule",
            Self::RidgeRegression => "ridge_regression",
            Self::SeasonalInventory => "seasonal_inventory",
            Self::SeasonalRegression => "seasonal_regression",
            Self::SpatialHierarchical => "spatial_hierarchical",
            Self::ErrorCorrection => "error_correction",
            Self::PolynomialRidge => "polynomial_ridge",
            Self::SaturatingGrowth => "saturating_growth",
            Self::MarginEquilibrium => "margin_equilibrium",
            Self::NetworkCost => "network_cost",
            Self::CalendarSeasonal => "calendar_seasonal",
            Self::ConstantTrend => "constant_trend",
        }
    }
}

/// Configuration-level description of a forecaster, tagged by `method`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ForecasterSpec {
    ArHoltHybrid(ArHoltHybridConfig),
    VectorAutoregression(VectorAutoregressionConfig),
    Garch(GarchConfig),
    PolicyRule(PolicyRuleConfig),
    RidgeRegression(RidgeRegressionConfig),
    SeasonalInventory(SeasonalInventoryConfig),
    SeasonalRegression(SeasonalRegressionConfig),
    SpatialHierarchical(SpatialHierarchicalConfig),
    ErrorCorrection(ErrorCorrectionConfig),
    PolynomialRidge(PolynomialRidgeConfig),
    SaturatingGrowth(SaturatingGrowthConfig),
    MarginEquilibrium(MarginEquilibriumConfig),
    NetworkCost(NetworkCostConfig),
    CalendarSeasonal(CalendarSeasonalConfig),
    ConstantTrend(ConstantTrendConfig),
}

pub fn build_forecaster(spec: &ForecasterSpec) -> Arc<dyn FactorForecaster> {
    match spec {
        ForecasterSpec::ArHoltHybrid(cfg) => Arc::new(ArHoltHybridForecaster::new(cfg.clone())),
        ForecasterSpec::VectorAutoregression(cfg) => {
            Arc::new(VectorAutoregressionForecaster::new(cfg.clone()))
        }
        ForecasterSpec::Garch(cfg) => Arc::new(GarchForecaster::new(cfg.clone())),
        ForecasterSpec::PolicyRule(cfg) => Arc::new(PolicyRuleForecaster::new(cfg.clone())),
        ForecasterSpec::RidgeRegression(cfg) => {
            Arc::new(RidgeRegressionForecaster::new(cfg.clone()))
        }
        ForecasterSpec::SeasonalInventory(cfg) => {
            Arc::new(SeasonalInventoryForecaster::new(cfg.clone()))
        }
        ForecasterSpec::SeasonalRegression(cfg) => {
            Arc::new(SeasonalRegressionForecaster::new(cfg.clone()))
        }
        ForecasterSpec::SpatialHierarchical(cfg) => {
            Arc::new(SpatialHierarchicalForecaster::new(cfg.clone()))
        }
        ForecasterSpec::ErrorCorrection(cfg) => {
            Arc::new(ErrorCorrectionForecaster::new(cfg.clone()))
        }
        ForecasterSpec::PolynomialRidge(cfg) => {
            Arc::new(PolynomialRidgeForecaster::new(cfg.clone()))
        }
        ForecasterSpec::SaturatingGrowth(cfg) => {
            Arc::new(SaturatingGrowthForecaster::new(cfg.clone()))
        }
        ForecasterSpec::MarginEquilibrium(cfg) => {
            Arc::new(MarginEquilibriumForecaster::new(cfg.clone()))
        }
        ForecasterSpec::NetworkCost(cfg) => Arc::new(NetworkCostForecaster::new(cfg.clone())),
        ForecasterSpec::CalendarSeasonal(cfg) => {
            Arc::new(CalendarSeasonalForecaster::new(cfg.clone()))
        }
        ForecasterSpec::ConstantTrend(cfg) => Arc::new(ConstantTrendForecaster::new(cfg.clone())),
    }
}

fn factor(
    id: &str,
    category: FactorCategory,
    static_weight: f64,
    pass_through: f64,
    lookback_days: usize,
    forecaster: ForecasterSpec,
) -> Factor {
    Factor {
        id: id.to_string(),
        category,
        static_weight,
        pass_through,
        lookback_days,
        active: true,
        forecaster,
    }
}

/// Fifteen-factor catalogue of the domestic retail market. Static weights sum to 1.0.
pub fn default_factor_specs() -> Vec<Factor> {
    use FactorCategory::*;
    vec![
        factor(
            "dubai_crude",
            International,
            0.24,
            1.0,
            120,
            ForecasterSpec::ArHoltHybrid(ArHoltHybridConfig::default()),
        ),
        factor(
            "singapore_product",
            International,
            0.08,
            1.0,
            120,
            ForecasterSpec::VectorAutoregression(VectorAutoregressionConfig::default()),
        ),
        factor(
            "refinery_margin",
            International,
            0.06,
            0.5,
            120,
            ForecasterSpec::VectorAutoregression(VectorAutoregressionConfig::default()),
        ),
        factor("usd_krw", Fx, 0.15, 1.0, 250, ForecasterSpec::Garch(GarchConfig::default())),
        factor(
            "fuel_tax",
            Policy,
            0.12,
            1.0,
            365,
            ForecasterSpec::PolicyRule(PolicyRuleConfig::default()),
        ),
        factor(
            "import_cost",
            Policy,
            0.08,
            1.0,
            180,
            ForecasterSpec::RidgeRegression(RidgeRegressionConfig::default()),
        ),
        factor(
            "inventory",
            SupplyDemand,
            0.06,
            1.0,
            180,
            ForecasterSpec::SeasonalInventory(SeasonalInventoryConfig::default()),
        ),
        factor(
            "consumption",
            SupplyDemand,
            0.05,
            0.3,
            730,
            ForecasterSpec::SeasonalRegression(SeasonalRegressionConfig::default()),
        ),
        factor(
            "regional_consumption",
            SupplyDemand,
            0.04,
            0.3,
            180,
            ForecasterSpec::SpatialHierarchical(SpatialHierarchicalConfig::default()),
        ),
        factor(
            "cpi",
            Economic,
            0.03,
            0.5,
            365,
            ForecasterSpec::ErrorCorrection(ErrorCorrectionConfig::default()),
        ),
        factor(
            "land_price",
            Economic,
            0.02,
            0.2,
            365,
            ForecasterSpec::PolynomialRidge(PolynomialRidgeConfig::default()),
        ),
        factor(
            "vehicle_fleet",
            Economic,
            0.02,
            0.3,
            730,
            ForecasterSpec::SaturatingGrowth(SaturatingGrowthConfig::default()),
        ),
        factor(
            "retail_margin",
            Distribution,
            0.02,
            0.1,
            180,
            ForecasterSpec::MarginEquilibrium(MarginEquilibriumConfig::default()),
        ),
        factor(
            "logistics_cost",
            Distribution,
            0.01,
            0.5,
            180,
            ForecasterSpec::NetworkCost(NetworkCostConfig::default()),
        ),
        factor(
            "seasonality",
            Seasonal,
            0.02,
            1.0,
            0,
            ForecasterSpec::CalendarSeasonal(CalendarSeasonalConfig::default()),
        ),
    ]
}
