use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::fuel::FuelType;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub day_offset: usize,
    pub date: NaiveDate,
    pub price: f64,
    pub lower: f64,
    pub upper: f64,
    /// Heuristic 0.5..1 reliability score for the day.
    pub confidence: f64,
}

impl ForecastPoint {
    pub fn interval_width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Immutable output of one forecast run for one region and fuel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPath {
    pub run_id: String,
    pub region: String,
    pub fuel: FuelType,
    pub as_of: NaiveDate,
    pub current_price: f64,
    pub weight_generation: u64,
    pub points: Vec<ForecastPoint>,
}

impl ForecastPath {
    pub fn horizon(&self) -> usize {
        self.points.len()
    }

    pub fn point_for_date(&self, date: NaiveDate) -> Option<&ForecastPoint> {
        self.points.iter().find(|p| p.date == date)
    }

    pub fn final_price(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.price)
            .unwrap_or(self.current_price)
    }

    pub fn total_change_pct(&self) -> f64 {
        if self.current_price <= f64::EPSILON {
            return 0.0;
        }
        (self.final_price() - self.current_price) / self.current_price * 100.0
    }
}
