use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::fuel::FuelType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub region: String,
    pub fuel: FuelType,
    pub date: NaiveDate,
    pub run_id: String,
    pub day_offset: usize,
    pub predicted_price: f64,
    pub realized_price: f64,
    pub abs_error: f64,
    /// Signed, in percent of the realized price; positive when the forecast overstated.
    pub pct_error: f64,
}

impl AccuracyRecord {
    pub fn new(
        region: &str,
        fuel: FuelType,
        date: NaiveDate,
        run_id: &str,
        day_offset: usize,
        predicted_price: f64,
        realized_price: f64,
    ) -> Self {
        let diff = predicted_price - realized_price;
        let pct_error = if realized_price.abs() > f64::EPSILON {
            diff / realized_price * 100.0
        } else {
            0.0
        };
        Self {
            region: region.to_string(),
            fuel,
            date,
            run_id: run_id.to_string(),
            day_offset,
            predicted_price,
            realized_price,
            abs_error: diff.abs(),
            pct_error,
        }
    }

    pub fn abs_pct_error(&self) -> f64 {
        self.pct_error.abs()
    }

    /// Legacy dashboard figure: `100 - APE`, floored at zero.
    pub fn accuracy_pct(&self) -> f64 {
        (100.0 - self.abs_pct_error()).max(0.0)
    }
}
