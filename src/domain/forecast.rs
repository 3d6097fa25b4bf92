use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::time::utc_datetime;

/// Probabilistic bands keyed by percentile label, e.g. `{"10": 0.9, "90": 1.1}`.
pub type Properties = BTreeMap<String, f64>;

/// Read numeric percentile fields out of a JSON object. Non-numeric entries are ignored.
pub fn properties_from_json(value: &serde_json::Value) -> Option<Properties> {
    let object = value.as_object()?;
    let properties: Properties = object
        .iter()
        .filter_map(|(label, v)| v.as_f64().map(|v| (label.clone(), v)))
        .collect();
    Some(properties)
}

/// One stored forecast value of one model, flattened for blending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastValueRecord {
    #[serde(with = "utc_datetime")]
    pub target_time: DateTime<Utc>,
    /// NaN when the stored value is missing.
    pub expected_power_generation_megawatts: f64,
    #[serde(default)]
    pub adjust_mw: f64,
    #[serde(default)]
    pub properties: Option<Properties>,
    #[serde(with = "utc_datetime")]
    pub created_utc: DateTime<Utc>,
    pub model_name: String,
}

impl ForecastValueRecord {
    pub fn new(
        model_name: &str,
        target_time: DateTime<Utc>,
        expected_power_generation_megawatts: f64,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            target_time,
            expected_power_generation_megawatts,
            adjust_mw: 0.0,
            properties: None,
            created_utc,
            model_name: model_name.to_string(),
        }
    }

    pub fn with_adjust_mw(mut self, adjust_mw: f64) -> Self {
        self.adjust_mw = adjust_mw;
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Minutes between creation and the time the value predicts for.
    pub fn forecast_horizon_minutes(&self) -> i64 {
        (self.target_time - self.created_utc).num_minutes()
    }
}

/// A forecast value as served downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ForecastValue {
    #[serde(with = "utc_datetime")]
    pub target_time: DateTime<Utc>,
    #[validate(range(min = 0.0))]
    pub expected_power_generation_megawatts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub expected_power_generation_normalized: Option<f64>,
    /// Bias correction to subtract from the value; kept apart so the model output survives.
    #[serde(default)]
    pub adjust_mw: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl ForecastValue {
    pub fn new(target_time: DateTime<Utc>, expected_power_generation_megawatts: f64) -> Self {
        Self {
            target_time,
            expected_power_generation_megawatts,
            expected_power_generation_normalized: None,
            adjust_mw: 0.0,
            properties: None,
        }
    }

    /// Fill the normalized value from the installed capacity of the location.
    pub fn normalize(&mut self, installed_capacity_mw: Option<f64>) -> &mut Self {
        self.expected_power_generation_normalized = match installed_capacity_mw {
            Some(capacity) if capacity != 0.0 => {
                Some(self.expected_power_generation_megawatts / capacity)
            }
            _ => Some(0.0),
        };
        self
    }

    /// Subtract `adjust_mw`, capped to `±limit_mw`, from the value. Never goes below zero.
    pub fn adjust(&mut self, limit_mw: f64) -> &mut Self {
        if self.adjust_mw.is_finite() {
            let limit = limit_mw.abs();
            let adjust_mw = self.adjust_mw.clamp(-limit, limit);
            self.expected_power_generation_megawatts =
                (self.expected_power_generation_megawatts - adjust_mw).max(0.0);
        }
        self
    }
}

/// Result of blending several models for one target time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedForecastValue {
    #[serde(with = "utc_datetime")]
    pub target_time: DateTime<Utc>,
    pub expected_power_generation_megawatts: f64,
    pub adjust_mw: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    /// Total weight mass that went into the value.
    pub weight: f64,
}

impl From<BlendedForecastValue> for ForecastValue {
    fn from(blended: BlendedForecastValue) -> Self {
        Self {
            target_time: blended.target_time,
            expected_power_generation_megawatts: blended.expected_power_generation_megawatts,
            expected_power_generation_normalized: None,
            adjust_mw: blended.adjust_mw,
            properties: blended.properties,
        }
    }
}

/// A forecast for one GSP made by one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub gsp_id: i32,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(with = "utc_datetime")]
    pub forecast_creation_time: DateTime<Utc>,
    pub forecast_values: Vec<ForecastValue>,
}

impl Forecast {
    pub fn is_national(&self) -> bool {
        self.gsp_id == super::NATIONAL_GSP_ID
    }

    /// Normalize every value by the installed capacity of the forecast's location.
    pub fn normalize(&mut self, installed_capacity_mw: Option<f64>) -> &mut Self {
        for value in &mut self.forecast_values {
            value.normalize(installed_capacity_mw);
        }
        self
    }
}
