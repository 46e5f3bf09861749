//! Wire types of the prediction API.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use crate::model::Estimate;

/// One house to price. Every field is required; counts, areas, years and codes are unsigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseFeatures {
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub sqft_living: u32,
    pub sqft_lot: u32,
    pub floors: f64,
    pub waterfront: u8,
    pub view: u8,
    pub condition: u8,
    pub grade: u8,
    pub sqft_above: u32,
    pub sqft_basement: u32,
    pub year_built: u16,
    pub year_renovated: u16,
    pub zipcode: u32,
    pub lat: f64,
    pub long: f64,
    pub sqft_living15: u32,
    pub sqft_lot15: u32,
}

pub const FIELD_COUNT: usize = 18;

/// Column order of `HouseFeatures::as_row`.
pub const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "bedrooms", "bathrooms", "sqft_living", "sqft_lot", "floors", "waterfront", "view", "condition", "grade",
    "sqft_above", "sqft_basement", "year_built", "year_renovated", "zipcode", "lat", "long", "sqft_living15", "sqft_lot15",
];

impl HouseFeatures {
    pub fn field_index(name: &str) -> Option<usize> { FIELD_NAMES.iter().position(|f| *f == name) }

    pub fn as_row(&self) -> [f64; FIELD_COUNT] {
        [
            f64::from(self.bedrooms), self.bathrooms, f64::from(self.sqft_living), f64::from(self.sqft_lot),
            self.floors, f64::from(self.waterfront), f64::from(self.view), f64::from(self.condition), f64::from(self.grade),
            f64::from(self.sqft_above), f64::from(self.sqft_basement), f64::from(self.year_built), f64::from(self.year_renovated),
            f64::from(self.zipcode), self.lat, self.long, f64::from(self.sqft_living15), f64::from(self.sqft_lot15),
        ]
    }
}

/// Checks run after decoding, before any request reaches the model.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

impl Validate for HouseFeatures {
    fn validate(&self) -> Result<(), String> {
        for (name, v) in [("bathrooms", self.bathrooms), ("floors", self.floors)] {
            if !v.is_finite() || v < 0.0 { return Err(format!("{name} must be a non-negative number")); }
        }
        if self.waterfront > 1 { return Err("waterfront must be 0 or 1".into()); }
        if !(-90.0..=90.0).contains(&self.lat) { return Err("lat must be within [-90, 90]".into()); }
        if !(-180.0..=180.0).contains(&self.long) { return Err("long must be within [-180, 180]".into()); }
        Ok(())
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), String> {
        self.iter().enumerate().try_for_each(|(i, item)| item.validate().map_err(|e| format!("item {i}: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_price: f64,
    pub confidence_interval: [f64; 2],
    pub prediction_time: String,
}

impl PredictionResponse {
    pub fn from_estimate(estimate: &Estimate, at: DateTime<Utc>) -> Self {
        Self {
            predicted_price: estimate.price,
            confidence_interval: [estimate.low, estimate.high],
            prediction_time: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[cfg(test)]
pub(crate) fn sample_house() -> HouseFeatures {
    HouseFeatures {
        bedrooms: 3, bathrooms: 2.0, sqft_living: 1800, sqft_lot: 5000, floors: 1.0, waterfront: 0, view: 0,
        condition: 3, grade: 7, sqft_above: 1800, sqft_basement: 0, year_built: 1990, year_renovated: 0,
        zipcode: 98001, lat: 47.5, long: -122.2, sqft_living15: 1800, sqft_lot15: 5000,
    }
}
