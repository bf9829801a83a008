use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::accuracy::{AccuracyReport, AccuracyTracker, ForecastArchive, LoggedAccuracy};
use crate::confidence::ConfidenceEstimator;
use crate::config::Config;
use crate::constraints::{ClampEvent, ConstraintEnforcer};
use crate::ensemble::{combine, EnsembleOutput, FactorOutput};
use crate::error::{ForecastError, ForecastResult};
use crate::factor::{
    build_forecaster, FactorFailure, FactorForecaster, FactorPrediction, ForecastContext,
    HistoryWindow, PredictionStatus,
};
use crate::feed::{HistoryFeed, MarketSnapshot};
use crate::model::accuracy::AccuracyRecord;
use crate::model::factor::{Factor, FactorObservation};
use crate::model::forecast::ForecastPath;
use crate::model::fuel::{FuelProfile, FuelType};
use crate::model::region::NATIONAL_REGION_CODE;
use crate::regional::RegionalAdjuster;
use crate::store;
use crate::weights::{WeightRegistry, WeightSet};

/// Everything one completed run produced. Only fully constrained runs are
/// ever returned or archived.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastRun {
    pub run_id: String,
    pub fuel: FuelType,
    pub weight_generation: u64,
    /// Regional paths in configuration order, then the national aggregate.
    pub paths: Vec<ForecastPath>,
    pub observations: Vec<FactorObservation>,
    pub degraded: Vec<String>,
    pub clamps: BTreeMap<String, Vec<ClampEvent>>,
}

impl ForecastRun {
    pub fn national(&self) -> Option<&ForecastPath> {
        self.paths.iter().find(|p| p.region == NATIONAL_REGION_CODE)
    }

    pub fn path(&self, region: &str) -> Option<&ForecastPath> {
        self.paths.iter().find(|p| p.region == region)
    }
}

struct LoadedFactor {
    factor: Factor,
    forecaster: Arc<dyn FactorForecaster>,
    window: Result<HistoryWindow, FactorFailure>,
}

pub struct ForecastEngine {
    config: Arc<Config>,
    feed: Arc<dyn HistoryFeed>,
    forecasters: BTreeMap<String, Arc<dyn FactorForecaster>>,
    registry: WeightRegistry,
    tracker: Mutex<AccuracyTracker>,
    archive: Mutex<ForecastArchive>,
    adjuster: RegionalAdjuster,
    confidence: ConfidenceEstimator,
}

impl ForecastEngine {
    /// Validates `config` and restores any persisted weights and accuracy log.
    pub fn new(config: Config, feed: Arc<dyn HistoryFeed>) -> ForecastResult<Self> {
        config.validate()?;
        if config.regions.is_empty() {
            return Err(ForecastError::InvalidConfiguration(
                "at least one region profile is required".to_string(),
            ));
        }
        let registry = WeightRegistry::new(config.static_weights(), config.engine.momentum)?;
        let forecasters = config
            .active_factors()
            .map(|f| (f.id.clone(), build_forecaster(&f.forecaster)))
            .collect();
        let mut tracker = AccuracyTracker::new(config.engine.accuracy_window_days);

        let mut snapshot_restored = false;
        if let Some(path) = &config.store.weight_snapshot {
            if let Some(set) = store::load_weight_snapshot_from_path(path)? {
                let restored = registry.restore(&set);
                snapshot_restored = true;
                tracing::info!(generation = restored.generation, "weight snapshot restored");
            }
        }
        if let Some(path) = &config.store.accuracy_db {
            let count = tracker.replay(store::load_accuracy_log(path, None)?);
            tracing::info!(count, "accuracy log replayed");
            if count > 0 && !snapshot_restored {
                let _ = registry.publish(&tracker.factor_scores());
            }
        }

        let archive = ForecastArchive::with_retention(config.engine.archive_retention_runs);
        Ok(Self {
            adjuster: RegionalAdjuster::new(config.regional.clone()),
            confidence: ConfidenceEstimator::new(config.engine.confidence()),
            config: Arc::new(config),
            feed,
            forecasters,
            registry,
            tracker: Mutex::new(tracker),
            archive: Mutex::new(archive),
        })
    }

    /// Swap in a prebuilt forecaster for an active factor.
    pub fn with_forecaster(
        mut self,
        factor_id: &str,
        forecaster: Arc<dyn FactorForecaster>,
    ) -> ForecastResult<Self> {
        match self.forecasters.get_mut(factor_id) {
            Some(slot) => *slot = forecaster,
            None => {
                return Err(ForecastError::InvalidConfiguration(format!(
                    "no active factor '{factor_id}' to attach a forecaster to"
                )))
            }
        }
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get_weights(&self) -> Arc<WeightSet> {
        self.registry.snapshot()
    }

    /// Score-derived component of the weights, before blending with the statics.
    pub async fn dynamic_weights(&self) -> BTreeMap<String, f64> {
        let scores = self.tracker.lock().await.factor_scores();
        self.registry.dynamic_weights(&scores)
    }

    /// Weights the registry would publish from the tracker's current scores.
    pub async fn effective_weights(&self) -> BTreeMap<String, f64> {
        let scores = self.tracker.lock().await.factor_scores();
        self.registry.effective_weights(&scores)
    }

    pub async fn accuracy_report(&self) -> AccuracyReport {
        self.tracker.lock().await.report()
    }

    pub async fn accuracy_records(&self) -> Vec<AccuracyRecord> {
        self.tracker.lock().await.records().to_vec()
    }

    pub async fn archived_runs(&self) -> usize {
        self.archive.lock().await.len()
    }

    pub async fn generate_forecast(
        &self,
        fuel: FuelType,
        horizon: usize,
        snapshot: &MarketSnapshot,
    ) -> ForecastResult<Vec<ForecastPath>> {
        let (_tx, rx) = watch::channel(false);
        Ok(self.run_forecast(fuel, horizon, snapshot, rx).await?.paths)
    }

    /// Full pipeline for one fuel. `cancel` is checked between stages; a
    /// cancelled run publishes nothing.
    pub async fn run_forecast(
        &self,
        fuel: FuelType,
        horizon: usize,
        snapshot: &MarketSnapshot,
        cancel: watch::Receiver<bool>,
    ) -> ForecastResult<ForecastRun> {
        let max = self.config.engine.max_horizon;
        if horizon == 0 || horizon > max {
            return Err(ForecastError::InvalidHorizon {
                requested: horizon,
                max,
            });
        }
        let profile = self.config.fuel_profile(fuel)?.clone();
        if !snapshot.national_price.is_finite() || snapshot.national_price <= 0.0 {
            return Err(ForecastError::InvalidConfiguration(format!(
                "national price {} must be positive",
                snapshot.national_price
            )));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let weights = self.registry.snapshot();
        tracing::info!(
            run_id = %run_id,
            fuel = %fuel,
            horizon,
            generation = weights.generation,
            "forecast run started"
        );

        let loaded = self.load_windows(fuel);
        check_cancelled(&cancel)?;

        let outputs = self.predict_all(loaded, snapshot, &profile, horizon).await;
        check_cancelled(&cancel)?;

        let ensemble = combine(&weights, &outputs, &profile, horizon);
        let (paths, clamps) = self.build_paths(&run_id, fuel, &profile, &ensemble, snapshot)?;
        check_cancelled(&cancel)?;

        let observations = outputs
            .into_values()
            .flat_map(|o| o.prediction.into_observations(&o.factor_id, snapshot.as_of))
            .collect();
        self.archive.lock().await.push(
            &run_id,
            fuel,
            snapshot.as_of,
            paths.clone(),
            ensemble.contributions.clone(),
        );
        tracing::info!(
            run_id = %run_id,
            fuel = %fuel,
            paths = paths.len(),
            degraded = ensemble.degraded.len(),
            "forecast run completed"
        );

        Ok(ForecastRun {
            run_id,
            fuel,
            weight_generation: weights.generation,
            paths,
            observations,
            degraded: ensemble.degraded,
            clamps,
        })
    }

    fn load_windows(&self, fuel: FuelType) -> Vec<LoadedFactor> {
        let mut loaded: Vec<LoadedFactor> = self
            .config
            .active_factors()
            .filter_map(|factor| {
                let forecaster = Arc::clone(self.forecasters.get(&factor.id)?);
                let window = match self.feed.load_history(&factor.id, fuel, factor.lookback_days) {
                    Ok(window) => Ok(window),
                    Err(_) if forecaster.min_history() == 0 => {
                        Ok(HistoryWindow::new(factor.id.clone(), Vec::new()))
                    }
                    Err(e) => {
                        tracing::warn!(factor = %factor.id, error = %e, "history unavailable");
                        Err(FactorFailure::Unavailable(e.to_string()))
                    }
                };
                Some(LoadedFactor {
                    factor: factor.clone(),
                    forecaster,
                    window,
                })
            })
            .collect();

        // Every factor sees the others' series as companions unless the feed
        // already supplied one under that name.
        let series: BTreeMap<String, Vec<f64>> = loaded
            .iter()
            .filter_map(|l| Some((l.factor.id.clone(), l.window.as_ref().ok()?.values())))
            .collect();
        for l in &mut loaded {
            if let Ok(window) = &mut l.window {
                for (id, values) in &series {
                    if *id != l.factor.id && !window.companions.contains_key(id) {
                        window.companions.insert(id.clone(), values.clone());
                    }
                }
            }
        }
        loaded
    }

    async fn predict_all(
        &self,
        loaded: Vec<LoadedFactor>,
        snapshot: &MarketSnapshot,
        profile: &FuelProfile,
        horizon: usize,
    ) -> BTreeMap<String, FactorOutput> {
        let timeout_ms = self.config.engine.forecaster_timeout_ms;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        let mut pending = Vec::with_capacity(loaded.len());
        for l in loaded {
            let ctx = ForecastContext {
                as_of: snapshot.as_of,
                horizon,
                fuel: profile.clone(),
                pass_through: l.factor.pass_through,
                degraded_variance: self.config.engine.degraded_variance,
            };
            let method = l.forecaster.method();
            let task = match l.window {
                Ok(window) => {
                    let forecaster = l.forecaster;
                    let task_ctx = ctx.clone();
                    Ok(tokio::task::spawn_blocking(move || {
                        forecaster.predict(&window, &task_ctx)
                    }))
                }
                Err(failure) => Err(failure),
            };
            pending.push((l.factor, method, ctx, task));
        }

        let mut outputs = BTreeMap::new();
        for (factor, method, ctx, task) in pending {
            let prediction = match task {
                Err(failure) => FactorPrediction::degraded(&ctx, failure),
                Ok(handle) => match tokio::time::timeout_at(deadline, handle).await {
                    Ok(Ok(prediction)) => prediction,
                    Ok(Err(e)) => FactorPrediction::degraded(
                        &ctx,
                        FactorFailure::Numerical(format!("forecaster task failed: {e}")),
                    ),
                    Err(_) => FactorPrediction::degraded(
                        &ctx,
                        FactorFailure::TimedOut {
                            after_ms: timeout_ms,
                        },
                    ),
                },
            };
            if let PredictionStatus::Degraded(reason) = &prediction.status {
                tracing::warn!(
                    factor = %factor.id,
                    method = method.as_str(),
                    reason = %reason,
                    "factor degraded"
                );
            }
            outputs.insert(
                factor.id.clone(),
                FactorOutput {
                    factor_id: factor.id,
                    category: factor.category,
                    prediction,
                },
            );
        }
        outputs
    }

    #[allow(clippy::type_complexity)]
    fn build_paths(
        &self,
        run_id: &str,
        fuel: FuelType,
        profile: &FuelProfile,
        ensemble: &EnsembleOutput,
        snapshot: &MarketSnapshot,
    ) -> ForecastResult<(Vec<ForecastPath>, BTreeMap<String, Vec<ClampEvent>>)> {
        let enforcer = ConstraintEnforcer::for_fuel(&self.config.constraints, profile);
        let horizon = ensemble.horizon();
        let mut paths = Vec::with_capacity(self.config.regions.len() + 1);
        let mut clamps = BTreeMap::new();

        let mut weight_total = 0.0;
        let mut national_anchor = 0.0;
        let mut national_prices = vec![0.0; horizon];

        for region in &self.config.regions {
            let anchor = self.adjuster.anchor(
                region,
                profile,
                snapshot.national_price,
                snapshot.regional(&region.code),
            );
            let regional = self.adjuster.adjust(ensemble, region, profile, anchor);
            let constrained = enforcer.enforce(&region.code, anchor, &regional.prices)?;

            let w = region.aggregate_weight;
            weight_total += w;
            national_anchor += w * anchor;
            for (acc, p) in national_prices.iter_mut().zip(&constrained.prices) {
                *acc += w * p;
            }

            paths.push(ForecastPath {
                run_id: run_id.to_string(),
                region: region.code.clone(),
                fuel,
                as_of: snapshot.as_of,
                current_price: anchor,
                weight_generation: ensemble.weight_generation,
                points: self.confidence.points(
                    Some(region),
                    snapshot.as_of,
                    &constrained.prices,
                    &regional.sigmas,
                ),
            });
            if !constrained.events.is_empty() {
                clamps.insert(region.code.clone(), constrained.events);
            }
        }

        // Weighted mean of regional paths; equal weights if none are positive.
        let (national_anchor, national_prices) = if weight_total > f64::EPSILON {
            (
                national_anchor / weight_total,
                national_prices.iter().map(|p| p / weight_total).collect::<Vec<_>>(),
            )
        } else {
            let n = paths.len() as f64;
            let anchor = paths.iter().map(|p| p.current_price).sum::<f64>() / n;
            let prices = (0..horizon)
                .map(|t| paths.iter().map(|p| p.points[t].price).sum::<f64>() / n)
                .collect();
            (anchor, prices)
        };
        let constrained = enforcer.enforce(
            NATIONAL_REGION_CODE,
            national_anchor,
            &national_prices,
        )?;
        let sigmas: Vec<f64> = (0..horizon).map(|t| ensemble.sigma(t)).collect();
        paths.push(ForecastPath {
            run_id: run_id.to_string(),
            region: NATIONAL_REGION_CODE.to_string(),
            fuel,
            as_of: snapshot.as_of,
            current_price: national_anchor,
            weight_generation: ensemble.weight_generation,
            points: self
                .confidence
                .points(None, snapshot.as_of, &constrained.prices, &sigmas),
        });

        Ok((paths, clamps))
    }

    /// Match a realized price against the latest archived forecast covering it,
    /// then publish the next weight generation. Returns `None` when no archived
    /// forecast covers the date.
    pub async fn record_actual(
        &self,
        region: &str,
        fuel: FuelType,
        date: chrono::NaiveDate,
        price: f64,
    ) -> ForecastResult<Option<AccuracyRecord>> {
        if !price.is_finite() || price <= 0.0 {
            tracing::warn!(
                region = %region,
                fuel = %fuel,
                price,
                "ignoring invalid realized price"
            );
            return Ok(None);
        }

        let matched = {
            let archive = self.archive.lock().await;
            archive.latest_covering(region, fuel, date).map(|m| {
                (
                    AccuracyRecord::new(
                        region,
                        fuel,
                        date,
                        &m.run.run_id,
                        m.point.day_offset,
                        m.point.price,
                        price,
                    ),
                    m.path.current_price,
                    m.contributions_on_day(),
                )
            })
        };
        let Some((record, reference, contributions)) = matched else {
            tracing::debug!(
                region = %region,
                fuel = %fuel,
                %date,
                "no archived forecast covers actual"
            );
            return Ok(None);
        };

        // The guard spans record, publish and persist so generations follow log order.
        let mut tracker = self.tracker.lock().await;
        let entry = LoggedAccuracy {
            record: record.clone(),
            reference_price: reference,
            contributions,
        };
        tracker.record(entry.record.clone(), entry.reference_price, &entry.contributions);
        let published = self.registry.publish(&tracker.factor_scores());
        tracing::info!(
            region = %region,
            fuel = %fuel,
            day_offset = record.day_offset,
            pct_error = record.pct_error,
            generation = published.generation,
            "actual recorded"
        );

        if let Some(path) = &self.config.store.accuracy_db {
            store::append_accuracy_log(path, std::slice::from_ref(&entry))?;
        }
        if let Some(path) = &self.config.store.weight_snapshot {
            store::persist_weight_snapshot_to_path(path, &published)?;
        }
        drop(tracker);
        Ok(Some(record))
    }
}

fn check_cancelled(cancel: &watch::Receiver<bool>) -> ForecastResult<()> {
    if *cancel.borrow() {
        tracing::info!("forecast run cancelled");
        return Err(ForecastError::Cancelled);
    }
    Ok(())
}
