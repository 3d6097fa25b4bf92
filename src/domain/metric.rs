use std::collections::HashSet;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::utc_datetime;

/// Historical error statistic for one (time of day, forecast horizon) slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub time_of_day: NaiveTime,
    pub forecast_horizon_minutes: i32,
    pub number_of_data_points: i32,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(with = "utc_datetime")]
    pub created_utc: DateTime<Utc>,
}

impl MetricValue {
    pub fn slot(&self) -> (NaiveTime, i32) {
        (self.time_of_day, self.forecast_horizon_minutes)
    }

    /// Keep the most recently created value per slot, ordered by slot.
    pub fn latest_per_slot(mut values: Vec<MetricValue>) -> Vec<MetricValue> {
        values.sort_by(|a, b| a.slot().cmp(&b.slot()).then(b.created_utc.cmp(&a.created_utc)));
        let mut seen = HashSet::new();
        values.retain(|v| seen.insert(v.slot()));
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn me(value: f64, hour: u32, horizon: i32, created_offset_min: i64) -> MetricValue {
        MetricValue {
            value,
            time_of_day: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            forecast_horizon_minutes: horizon,
            number_of_data_points: 10,
            model_name: None,
            created_utc: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(created_offset_min),
        }
    }

    #[test]
    fn test_latest_per_slot_keeps_newest() {
        let values = vec![me(1.0, 12, 0, 0), me(2.0, 12, 0, 5), me(3.0, 12, 30, 0)];
        let latest = MetricValue::latest_per_slot(values);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].value, 2.0);
        assert_eq!(latest[1].value, 3.0);
    }
}
