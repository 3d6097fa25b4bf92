use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{properties_from_json, ForecastValueRecord};

/// Forecast value joined with its model name.
#[derive(Debug, Clone, FromRow)]
pub struct ForecastValueRow {
    pub target_time: DateTime<Utc>,
    pub expected_power_generation_megawatts: Option<f64>,
    pub adjust_mw: Option<f64>,
    pub properties: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub model_name: String,
}

impl From<ForecastValueRow> for ForecastValueRecord {
    fn from(row: ForecastValueRow) -> Self {
        Self {
            target_time: row.target_time,
            expected_power_generation_megawatts: row
                .expected_power_generation_megawatts
                .unwrap_or(f64::NAN),
            adjust_mw: row.adjust_mw.unwrap_or(0.0),
            properties: row.properties.as_ref().and_then(properties_from_json),
            created_utc: row.created_utc,
            model_name: row.model_name,
        }
    }
}
