use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed feed response, kept as loose JSON. The shape varies per
/// station so nothing is enforced until flattening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawReading(pub Value);

impl RawReading {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn data(&self) -> Option<&Value> {
        self.0.get("data")
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// Current-reading columns shared by every forecast row of one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentFeatures {
    pub timestamp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub aqi: Option<f64>,
    pub dominant_pollutant: Option<String>,
    /// `iaqi` readings in feed order; the key set differs between payloads.
    pub pollutants: Vec<(String, Option<f64>)>,
}

impl CurrentFeatures {
    pub fn pollutant(&self, code: &str) -> Option<f64> {
        self.pollutants
            .iter()
            .find(|(k, _)| k == code)
            .and_then(|(_, v)| *v)
    }

    pub fn has_pollutant(&self, code: &str) -> bool {
        self.pollutants.iter().any(|(k, _)| k == code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub current: CurrentFeatures,
    pub forecast_date: NaiveDate,
    pub pollutant: String,
    pub forecast_avg: Option<f64>,
    pub forecast_min: Option<f64>,
    pub forecast_max: Option<f64>,
}

/// A feature row tagged with the backfill day it was collected under. The
/// feed has no history endpoint, so the values are the snapshot current at
/// fetch time, not measurements from `historical_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRecord {
    pub record: FeatureRecord,
    pub historical_date: NaiveDate,
}

pub const TIMESTAMP: &str = "timestamp";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const AQI: &str = "aqi";
pub const DOMINANT_POLLUTANT: &str = "dominant_pollutant";
pub const FORECAST_DATE: &str = "forecast_date";
pub const POLLUTANT: &str = "pollutant";
pub const FORECAST_AVG: &str = "forecast_avg";
pub const FORECAST_MIN: &str = "forecast_min";
pub const FORECAST_MAX: &str = "forecast_max";
pub const HISTORICAL_DATE: &str = "historical_date";

pub const CURRENT_COLUMNS: [&str; 5] = [TIMESTAMP, LATITUDE, LONGITUDE, AQI, DOMINANT_POLLUTANT];
pub const FORECAST_COLUMNS: [&str; 5] = [
    FORECAST_DATE,
    POLLUTANT,
    FORECAST_AVG,
    FORECAST_MIN,
    FORECAST_MAX,
];

/// Names a pollutant code may not take, since it would shadow a fixed column.
pub fn is_reserved_column(name: &str) -> bool {
    CURRENT_COLUMNS.contains(&name) || FORECAST_COLUMNS.contains(&name) || name == HISTORICAL_DATE
}
