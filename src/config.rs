use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::confidence::ConfidenceConfig;
use crate::constraints::ConstraintConfig;
use crate::error::{ForecastError, ForecastResult};
use crate::factor::default_factor_specs;
use crate::model::factor::Factor;
use crate::model::fuel::{default_fuel_profiles, FuelProfile, FuelType};
use crate::model::region::{default_region_profiles, RegionProfile, NATIONAL_REGION_CODE};
use crate::regional::RegionalConfig;
use crate::weights::validate_static_weights;

pub const CONFIG_PATH_ENV: &str = "FUELCAST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub constraints: ConstraintConfig,
    #[serde(default)]
    pub regional: RegionalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub regions: Vec<RegionProfile>,
    #[serde(default)]
    pub fuels: Vec<FuelProfile>,
    #[serde(default)]
    pub factors: Vec<Factor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_horizon: usize,
    pub max_horizon: usize,
    /// λ in `λ·static + (1 − λ)·dynamic`.
    pub momentum: f64,
    pub accuracy_window_days: i64,
    pub interval_z: f64,
    pub confidence_base: f64,
    pub forecaster_timeout_ms: u64,
    /// Per-day variance assigned to a degraded factor.
    pub degraded_variance: f64,
    /// Archived runs kept for accuracy matching; 0 keeps all of them.
    pub archive_retention_runs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_horizon: 7,
            max_horizon: 28,
            momentum: 0.7,
            accuracy_window_days: 30,
            interval_z: 1.96,
            confidence_base: 0.92,
            forecaster_timeout_ms: 2_000,
            degraded_variance: 4e-4,
            archive_retention_runs: 256,
        }
    }
}

impl EngineConfig {
    pub fn confidence(&self) -> ConfidenceConfig {
        ConfidenceConfig {
            z_multiplier: self.interval_z,
            base_score: self.confidence_base,
            ..ConfidenceConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: "fuelcast.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file for the accuracy log. Unset keeps everything in memory.
    pub accuracy_db: Option<PathBuf>,
    /// JSON snapshot of the latest weight set.
    pub weight_snapshot: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            engine: EngineConfig::default(),
            constraints: ConstraintConfig::default(),
            regional: RegionalConfig::default(),
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
            regions: Vec::new(),
            fuels: Vec::new(),
            factors: Vec::new(),
        };
        config.fill_catalogues();
        config
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(Path::new(&path))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s).context("failed to parse configuration")?;
        config.fill_catalogues();
        config.validate()?;
        Ok(config)
    }

    /// Omitted catalogues fall back to the built-in market definitions.
    fn fill_catalogues(&mut self) {
        if self.regions.is_empty() {
            self.regions = default_region_profiles();
        }
        if self.fuels.is_empty() {
            self.fuels = default_fuel_profiles();
        }
        if self.factors.is_empty() {
            self.factors = default_factor_specs();
        }
    }

    pub fn active_factors(&self) -> impl Iterator<Item = &Factor> {
        self.factors.iter().filter(|f| f.active)
    }

    pub fn static_weights(&self) -> BTreeMap<String, f64> {
        self.active_factors()
            .map(|f| (f.id.clone(), f.static_weight))
            .collect()
    }

    pub fn fuel_profile(&self, fuel: FuelType) -> ForecastResult<&FuelProfile> {
        self.fuels
            .iter()
            .find(|p| p.fuel == fuel)
            .ok_or_else(|| ForecastError::MissingProfile {
                kind: "fuel",
                code: fuel.to_string(),
            })
    }

    pub fn region_profile(&self, code: &str) -> ForecastResult<&RegionProfile> {
        self.regions
            .iter()
            .find(|r| r.code == code)
            .ok_or_else(|| ForecastError::MissingProfile {
                kind: "region",
                code: code.to_string(),
            })
    }

    pub fn validate(&self) -> ForecastResult<()> {
        let invalid = |msg: String| Err(ForecastError::InvalidConfiguration(msg));
        let e = &self.engine;
        if e.max_horizon == 0 || e.default_horizon == 0 || e.default_horizon > e.max_horizon {
            return invalid(format!(
                "engine horizons: default {} must be within 1..={}",
                e.default_horizon, e.max_horizon
            ));
        }
        if !(0.0..=1.0).contains(&e.momentum) {
            return invalid(format!("engine.momentum {} outside [0, 1]", e.momentum));
        }
        if e.interval_z < 0.0 || !e.interval_z.is_finite() {
            return invalid(format!("engine.interval_z {} must be >= 0", e.interval_z));
        }
        if e.forecaster_timeout_ms == 0 {
            return invalid("engine.forecaster_timeout_ms must be > 0".to_string());
        }
        if e.degraded_variance < 0.0 {
            return invalid("engine.degraded_variance must be >= 0".to_string());
        }

        let c = &self.constraints;
        if !(c.absolute_lower_ratio > 0.0
            && c.absolute_lower_ratio <= 1.0
            && c.absolute_upper_ratio >= 1.0)
        {
            return invalid(format!(
                "absolute bounds {}..{} must straddle 1.0",
                c.absolute_lower_ratio, c.absolute_upper_ratio
            ));
        }
        if c.daily_limit.is_some_and(|l| l < 0.0) || c.annual_max_change < 0.0 {
            return invalid("constraint limits must be non-negative".to_string());
        }

        let mut codes = BTreeSet::new();
        for r in &self.regions {
            if r.code == NATIONAL_REGION_CODE {
                return invalid(format!("region code '{NATIONAL_REGION_CODE}' is reserved"));
            }
            if !codes.insert(r.code.as_str()) {
                return invalid(format!("duplicate region {}", r.code));
            }
            let unit = 0.0..=1.0;
            if !unit.contains(&r.competition_index) || !unit.contains(&r.infrastructure_score) {
                return invalid(format!(
                    "region {}: competition and infrastructure must be in [0, 1]",
                    r.code
                ));
            }
            if r.volatility_factor <= 0.0 || r.aggregate_weight < 0.0 {
                return invalid(format!("region {}: non-positive volatility or weight", r.code));
            }
        }

        let mut fuels = BTreeSet::new();
        for f in &self.fuels {
            if !fuels.insert(f.fuel) {
                return invalid(format!("duplicate fuel profile {}", f.fuel));
            }
            if f.weekly_volatility < 0.0 || f.international_sensitivity <= 0.0 {
                return invalid(format!("fuel {}: invalid volatility or sensitivity", f.fuel));
            }
        }

        let mut ids = BTreeSet::new();
        for f in &self.factors {
            if !ids.insert(f.id.as_str()) {
                return invalid(format!("duplicate factor {}", f.id));
            }
        }
        validate_static_weights(&self.static_weights())
    }
}
