use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::accuracy::AccuracyRecord;
use crate::model::forecast::{ForecastPath, ForecastPoint};
use crate::model::fuel::FuelType;

pub const DEFAULT_METRIC_WINDOW: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ErrorSample {
    realized: f64,
    predicted: f64,
    reference: f64,
}

/// Rolling error statistics over the most recent `window` forecast/actual pairs.
#[derive(Debug, Clone)]
pub struct RollingErrorMetrics {
    window: usize,
    samples: VecDeque<ErrorSample>,
}

impl Default for RollingErrorMetrics {
    fn default() -> Self {
        Self::with_window(DEFAULT_METRIC_WINDOW)
    }
}

impl RollingErrorMetrics {
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::with_capacity(window.max(1)),
        }
    }

    /// `reference` is the day-0 price the forecast started from; it defines direction.
    pub fn observe(&mut self, realized: f64, predicted: f64, reference: f64) {
        if !realized.is_finite() || !predicted.is_finite() || realized.abs() <= f64::EPSILON {
            return;
        }
        self.samples.push_back(ErrorSample {
            realized,
            predicted,
            reference,
        });
        if self.samples.len() > self.window {
            let _ = self.samples.pop_front();
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn mean_of(&self, f: impl Fn(&ErrorSample) -> f64) -> Option<f64> {
        let n = self.samples.len();
        if n == 0 {
            return None;
        }
        Some(self.samples.iter().map(f).sum::<f64>() / n as f64)
    }

    pub fn mae(&self) -> Option<f64> {
        self.mean_of(|s| (s.predicted - s.realized).abs())
    }

    /// Mean absolute percentage error, in percent.
    pub fn mape(&self) -> Option<f64> {
        self.mean_of(|s| ((s.predicted - s.realized) / s.realized).abs() * 100.0)
    }

    pub fn rmse(&self) -> Option<f64> {
        self.mean_of(|s| (s.predicted - s.realized).powi(2))
            .map(f64::sqrt)
    }

    /// Share of samples where the forecast moved in the same direction as the
    /// realized price, a flat/flat pair counting as a hit.
    pub fn hit_rate(&self) -> Option<f64> {
        self.mean_of(|s| {
            let pred = s.predicted - s.reference;
            let real = s.realized - s.reference;
            let same = pred * real > 0.0 || (pred.abs() < 1e-9 && real.abs() < 1e-9);
            if same {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Mean of `max(0, 100 − APE)` across samples.
    pub fn accuracy_pct(&self) -> Option<f64> {
        self.mean_of(|s| (100.0 - ((s.predicted - s.realized) / s.realized).abs() * 100.0).max(0.0))
    }

    pub fn summary(&self, region: &str, fuel: Option<FuelType>) -> AccuracySummary {
        AccuracySummary {
            region: region.to_string(),
            fuel,
            samples: self.sample_count(),
            mae: self.mae(),
            mape: self.mape(),
            rmse: self.rmse(),
            hit_rate: self.hit_rate(),
            accuracy_pct: self.accuracy_pct(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub region: String,
    pub fuel: Option<FuelType>,
    pub samples: usize,
    pub mae: Option<f64>,
    pub mape: Option<f64>,
    pub rmse: Option<f64>,
    pub hit_rate: Option<f64>,
    pub accuracy_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<AccuracySummary>,
    pub overall: AccuracySummary,
}

/// One emitted forecast run, kept immutable for later comparison.
#[derive(Debug, Clone)]
pub struct ArchivedRun {
    pub sequence: u64,
    pub run_id: String,
    pub fuel: FuelType,
    pub as_of: NaiveDate,
    pub paths: Vec<ForecastPath>,
    /// Per-factor weighted contribution per horizon day, from the national combination.
    pub contributions: BTreeMap<String, Vec<f64>>,
}

/// The archived forecast point matched to a realized price.
#[derive(Debug, Clone)]
pub struct ArchivedMatch<'a> {
    pub run: &'a ArchivedRun,
    pub path: &'a ForecastPath,
    pub point: &'a ForecastPoint,
}

impl ArchivedMatch<'_> {
    pub fn contributions_on_day(&self) -> BTreeMap<String, f64> {
        let idx = self.point.day_offset.saturating_sub(1);
        self.run
            .contributions
            .iter()
            .map(|(id, series)| (id.clone(), series.get(idx).copied().unwrap_or(0.0)))
            .collect()
    }
}

/// Archived runs, oldest first. With a retention of `n > 0` only the `n` most
/// recent runs are kept; zero keeps everything.
#[derive(Debug, Default)]
pub struct ForecastArchive {
    runs: VecDeque<ArchivedRun>,
    next_sequence: u64,
    max_runs: usize,
}

impl ForecastArchive {
    pub fn with_retention(max_runs: usize) -> Self {
        Self {
            max_runs,
            ..Self::default()
        }
    }

    pub fn push(
        &mut self,
        run_id: &str,
        fuel: FuelType,
        as_of: NaiveDate,
        paths: Vec<ForecastPath>,
        contributions: BTreeMap<String, Vec<f64>>,
    ) {
        self.next_sequence += 1;
        self.runs.push_back(ArchivedRun {
            sequence: self.next_sequence,
            run_id: run_id.to_string(),
            fuel,
            as_of,
            paths,
            contributions,
        });
        while self.max_runs > 0 && self.runs.len() > self.max_runs {
            let _ = self.runs.pop_front();
        }
    }

    /// Drop runs issued before `cutoff`. Returns how many were removed.
    pub fn prune_before(&mut self, cutoff: NaiveDate) -> usize {
        let before = self.runs.len();
        self.runs.retain(|run| run.as_of >= cutoff);
        before - self.runs.len()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn run(&self, run_id: &str) -> Option<&ArchivedRun> {
        self.runs.iter().find(|r| r.run_id == run_id)
    }

    /// Most recently archived forecast covering `(region, fuel, date)`.
    pub fn latest_covering(
        &self,
        region: &str,
        fuel: FuelType,
        date: NaiveDate,
    ) -> Option<ArchivedMatch<'_>> {
        self.runs
            .iter()
            .rev()
            .filter(|run| run.fuel == fuel && run.as_of < date)
            .find_map(|run| {
                let path = run.paths.iter().find(|p| p.region == region)?;
                let point = path.point_for_date(date)?;
                Some(ArchivedMatch { run, path, point })
            })
    }
}

/// Splits an absolute percentage error across factors in proportion to
/// `|c_i| / Σ|c_j|`. A heuristic, not a causal decomposition.
pub fn attribute_error(ape: f64, contributions: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = contributions.values().map(|c| c.abs()).sum();
    contributions
        .iter()
        .map(|(id, c)| {
            let share = if total > f64::EPSILON {
                c.abs() / total
            } else {
                0.0
            };
            (id.clone(), ape * share)
        })
        .collect()
}

/// One persisted accuracy log row together with what is needed to re-attribute
/// it: the naive reference price and the per-factor contributions on that day.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedAccuracy {
    pub record: AccuracyRecord,
    pub reference_price: f64,
    pub contributions: BTreeMap<String, f64>,
}

/// Append-only accuracy log plus trailing per-factor attributed errors.
#[derive(Debug)]
pub struct AccuracyTracker {
    window_days: i64,
    metric_window: usize,
    records: Vec<AccuracyRecord>,
    factor_errors: BTreeMap<String, VecDeque<(NaiveDate, f64)>>,
    by_series: BTreeMap<(String, FuelType), RollingErrorMetrics>,
    overall: RollingErrorMetrics,
}

impl AccuracyTracker {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days: window_days.max(1),
            metric_window: DEFAULT_METRIC_WINDOW,
            records: Vec::new(),
            factor_errors: BTreeMap::new(),
            by_series: BTreeMap::new(),
            overall: RollingErrorMetrics::default(),
        }
    }

    pub fn records(&self) -> &[AccuracyRecord] {
        &self.records
    }

    /// Append a record and attribute its error to the contributing factors.
    pub fn record(
        &mut self,
        record: AccuracyRecord,
        reference_price: f64,
        contributions: &BTreeMap<String, f64>,
    ) {
        let attributed = attribute_error(record.abs_pct_error(), contributions);
        for (factor_id, err) in attributed {
            let entries = self.factor_errors.entry(factor_id).or_default();
            entries.push_back((record.date, err));
        }
        self.prune(record.date);

        let window = self.metric_window;
        self.by_series
            .entry((record.region.clone(), record.fuel))
            .or_insert_with(|| RollingErrorMetrics::with_window(window))
            .observe(record.realized_price, record.predicted_price, reference_price);
        self.overall
            .observe(record.realized_price, record.predicted_price, reference_price);
        self.records.push(record);
    }

    /// Rebuild tracker state from a persisted log, oldest entry first.
    pub fn replay<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = LoggedAccuracy>,
    {
        let mut replayed = 0;
        for entry in entries {
            self.record(entry.record, entry.reference_price, &entry.contributions);
            replayed += 1;
        }
        replayed
    }

    fn prune(&mut self, latest: NaiveDate) {
        let cutoff = latest - chrono::Duration::days(self.window_days);
        for entries in self.factor_errors.values_mut() {
            while entries.front().map(|(d, _)| *d <= cutoff).unwrap_or(false) {
                let _ = entries.pop_front();
            }
        }
        self.factor_errors.retain(|_, entries| !entries.is_empty());
    }

    /// Trailing mean of attributed percentage error per factor with history.
    pub fn factor_mape(&self) -> BTreeMap<String, f64> {
        self.factor_errors
            .iter()
            .map(|(id, entries)| {
                let n = entries.len().max(1) as f64;
                (id.clone(), entries.iter().map(|(_, e)| e).sum::<f64>() / n)
            })
            .collect()
    }

    /// `1 / (1 + rolling MAPE)` per factor with history.
    pub fn factor_scores(&self) -> BTreeMap<String, f64> {
        self.factor_mape()
            .into_iter()
            .map(|(id, mape)| (id, 1.0 / (1.0 + mape.max(0.0))))
            .collect()
    }

    pub fn metrics(&self, region: &str, fuel: FuelType) -> Option<&RollingErrorMetrics> {
        self.by_series.get(&(region.to_string(), fuel))
    }

    pub fn report(&self) -> AccuracyReport {
        AccuracyReport {
            generated_at: Utc::now(),
            entries: self
                .by_series
                .iter()
                .map(|((region, fuel), m)| m.summary(region, Some(*fuel)))
                .collect(),
            overall: self.overall.summary("all", None),
        }
    }
}
