//! Bias correction of the national forecast from historical mean error (ME).
//!
//! ME statistics are bucketed by time of day and forecast horizon. Each value
//! of the national forecast gets the ME of its own bucket as `adjust_mw`,
//! capped to a share of the value itself.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{Forecast, MetricValue};
use crate::store::{MetricQuery, MetricValueStore};

pub const DEFAULT_MAX_ADJUST_PERCENTAGE: f64 = 0.1;
pub const DEFAULT_ME_METRIC_NAME: &str = "Half Hourly ME";

#[derive(Debug, Clone, PartialEq)]
pub struct AdjustSettings {
    pub metric_name: String,
    /// Overrides the model name of the forecast when reading ME values.
    pub model_name: Option<String>,
    /// Largest correction as a fraction of the forecast value.
    pub max_adjust_percentage: f64,
}

impl Default for AdjustSettings {
    fn default() -> Self {
        Self {
            metric_name: DEFAULT_ME_METRIC_NAME.to_string(),
            model_name: None,
            max_adjust_percentage: DEFAULT_MAX_ADJUST_PERCENTAGE,
        }
    }
}

/// Cap an ME value to `±max_adjust_percentage × value`. Zero for a zero value or missing ME.
pub fn cap_adjust(me: f64, value: f64, max_adjust_percentage: f64) -> f64 {
    if value == 0.0 || !me.is_finite() {
        return 0.0;
    }
    let limit = (max_adjust_percentage * value).abs();
    me.clamp(-limit, limit)
}

/// ME value per half-hour datetime from `start`, for `rows` half hours.
///
/// Row `i` is matched on the time of day of its datetime and a forecast
/// horizon of `30 × i` minutes. Rows without an ME value map to `None`.
pub fn me_lookup_table(
    start: DateTime<Utc>,
    rows: usize,
    latest_me: &[MetricValue],
) -> BTreeMap<DateTime<Utc>, Option<f64>> {
    let by_slot: HashMap<(NaiveTime, i32), f64> =
        latest_me.iter().map(|m| (m.slot(), m.value)).collect();

    (0..rows)
        .map(|i| {
            let horizon_minutes = 30 * i as i32;
            let datetime = start + Duration::minutes(i64::from(horizon_minutes));
            let value = by_slot.get(&(datetime.time(), horizon_minutes)).copied();
            (datetime, value)
        })
        .collect()
}

/// Half hours needed to cover the forecast, both ends included.
fn lookup_rows(forecast: &Forecast) -> Option<(DateTime<Utc>, usize)> {
    let first = forecast.forecast_values.iter().map(|v| v.target_time).min()?;
    let last = forecast.forecast_values.iter().map(|v| v.target_time).max()?;
    let span_hours = ((last - first).num_seconds() as f64 / 3600.0).ceil() as usize;
    Some((first, span_hours * 2 + 1))
}

/// Write the capped ME correction into every value of `forecast`.
pub fn add_adjust_to_national_forecast(
    forecast: &mut Forecast,
    latest_me: &[MetricValue],
    max_adjust_percentage: f64,
) {
    if latest_me.is_empty() {
        warn!(
            gsp_id = forecast.gsp_id,
            "no ME values found, setting all adjusts to zero"
        );
        for value in &mut forecast.forecast_values {
            value.adjust_mw = 0.0;
        }
        return;
    }

    let Some((start, rows)) = lookup_rows(forecast) else {
        debug!("forecast has no values to adjust");
        return;
    };
    let lookup = me_lookup_table(start, rows, latest_me);

    for value in &mut forecast.forecast_values {
        let me = lookup.get(&value.target_time).copied().flatten();
        value.adjust_mw = match me {
            Some(me) => cap_adjust(
                me,
                value.expected_power_generation_megawatts,
                max_adjust_percentage,
            ),
            None => {
                debug!(target_time = %value.target_time, "no ME value, adjust is zero");
                0.0
            }
        };
    }
}

/// Add adjusts to the single national forecast in `forecasts`.
///
/// Other forecasts are left alone. Nothing happens unless exactly one
/// national forecast is present. ME read failures degrade to zero adjusts.
pub async fn add_adjust_to_forecasts(
    store: &dyn MetricValueStore,
    forecasts: &mut [Forecast],
    settings: &AdjustSettings,
) {
    info!(
        max_adjust_percentage = settings.max_adjust_percentage,
        "adding adjusts to national forecast"
    );

    let mut national = forecasts.iter_mut().filter(|f| f.is_national());
    let (Some(forecast), None) = (national.next(), national.next()) else {
        debug!("could not find a single national forecast, not adding adjust");
        return;
    };

    let query = MetricQuery {
        metric_name: settings.metric_name.clone(),
        model_name: settings
            .model_name
            .clone()
            .or_else(|| forecast.model_name.clone()),
    };

    let latest_me = match store.latest_metric_values(&query).await {
        Ok(values) => values,
        Err(err) => {
            warn!(error = %err, metric_name = %query.metric_name, "failed to read ME values");
            Vec::new()
        }
    };
    debug!(count = latest_me.len(), "read ME values");

    add_adjust_to_national_forecast(forecast, &latest_me, settings.max_adjust_percentage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ForecastValue;
    use crate::store::MockMetricValueStore;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, 9, 16, 30, 0).unwrap()
    }

    /// ME of `minutes of day + horizon × 10000` for every slot up to 8 hours ahead.
    fn latest_me() -> Vec<MetricValue> {
        let created = start();
        let mut values = Vec::new();
        for slot in 0..48 {
            let time_of_day = NaiveTime::from_hms_opt(slot / 2, (slot % 2) * 30, 0).unwrap();
            for horizon in (0..=480).step_by(30) {
                let minutes_of_day = (time_of_day.num_seconds_from_midnight() / 60) as f64;
                values.push(MetricValue {
                    value: minutes_of_day + f64::from(horizon) * 10000.0,
                    time_of_day,
                    forecast_horizon_minutes: horizon,
                    number_of_data_points: 10,
                    model_name: None,
                    created_utc: created,
                });
            }
        }
        values
    }

    fn forecast(gsp_id: i32, value: f64, n: i64) -> Forecast {
        Forecast {
            gsp_id,
            model_name: None,
            forecast_creation_time: start(),
            forecast_values: (0..n)
                .map(|i| ForecastValue::new(start() + Duration::minutes(30 * i), value))
                .collect(),
        }
    }

    #[test]
    fn test_lookup_table() {
        let table = me_lookup_table(start(), 17, &latest_me());
        let values: Vec<_> = table.values().copied().collect();
        assert_eq!(table.len(), 17);
        assert_eq!(values[0], Some(16.0 * 60.0 + 30.0));
        assert_eq!(values[1], Some(17.0 * 60.0 + 30.0 * 10000.0));
        assert_eq!(values[2], Some(17.0 * 60.0 + 30.0 + 60.0 * 10000.0));
    }

    #[test]
    fn test_missing_slot_is_none() {
        let me: Vec<_> = latest_me()
            .into_iter()
            .filter(|m| m.forecast_horizon_minutes != 30)
            .collect();
        let table = me_lookup_table(start(), 3, &me);
        assert_eq!(table[&(start() + Duration::minutes(30))], None);
    }

    #[test]
    fn test_cap_adjust() {
        assert_eq!(cap_adjust(50.0, 100.0, 0.1), 10.0);
        assert_eq!(cap_adjust(-50.0, 100.0, 0.1), -10.0);
        assert_eq!(cap_adjust(5.0, 100.0, 0.1), 5.0);
        assert_eq!(cap_adjust(5.0, 0.0, 0.1), 0.0);
        assert_eq!(cap_adjust(f64::NAN, 100.0, 0.1), 0.0);
    }

    #[test]
    fn test_adjust_national_forecast() {
        let mut national = forecast(0, 20_000.0, 3);
        add_adjust_to_national_forecast(&mut national, &latest_me(), 0.1);
        let adjusts: Vec<_> = national.forecast_values.iter().map(|v| v.adjust_mw).collect();
        assert_eq!(adjusts, vec![990.0, 2000.0, 2000.0]);
    }

    #[test]
    fn test_empty_me_gives_zero() {
        let mut national = forecast(0, 20_000.0, 3);
        national.forecast_values[0].adjust_mw = 7.0;
        add_adjust_to_national_forecast(&mut national, &[], 0.1);
        assert!(national.forecast_values.iter().all(|v| v.adjust_mw == 0.0));
    }

    #[tokio::test]
    async fn test_only_national_forecast_adjusted() {
        let mut store = MockMetricValueStore::new();
        store
            .expect_latest_metric_values()
            .withf(|q| q.metric_name == DEFAULT_ME_METRIC_NAME && q.model_name.is_none())
            .times(1)
            .returning(|_| Ok(latest_me()));

        let mut forecasts = vec![forecast(0, 20_000.0, 2), forecast(1, 20_000.0, 2)];
        add_adjust_to_forecasts(&store, &mut forecasts, &AdjustSettings::default()).await;
        assert_eq!(forecasts[0].forecast_values[0].adjust_mw, 990.0);
        assert_eq!(forecasts[1].forecast_values[0].adjust_mw, 0.0);
    }

    #[tokio::test]
    async fn test_two_national_forecasts_left_alone() {
        let mut store = MockMetricValueStore::new();
        store.expect_latest_metric_values().times(0);

        let mut forecasts = vec![forecast(0, 20_000.0, 2), forecast(0, 20_000.0, 2)];
        add_adjust_to_forecasts(&store, &mut forecasts, &AdjustSettings::default()).await;
        assert!(forecasts
            .iter()
            .flat_map(|f| &f.forecast_values)
            .all(|v| v.adjust_mw == 0.0));
    }

    #[tokio::test]
    async fn test_store_error_gives_zero_adjusts() {
        let mut store = MockMetricValueStore::new();
        store
            .expect_latest_metric_values()
            .returning(|_| Err(anyhow::anyhow!("timeout")));

        let mut forecasts = vec![forecast(0, 20_000.0, 2)];
        forecasts[0].model_name = Some("blend".to_string());
        add_adjust_to_forecasts(&store, &mut forecasts, &AdjustSettings::default()).await;
        assert!(forecasts[0].forecast_values.iter().all(|v| v.adjust_mw == 0.0));
    }

    proptest! {
        #[test]
        fn prop_adjust_within_cap(me in -1e6f64..1e6, value in 0.0f64..1e4, pct in 0.0f64..1.0) {
            let adjust = cap_adjust(me, value, pct);
            prop_assert!(adjust.abs() <= pct * value + 1e-9);
            if value == 0.0 {
                prop_assert_eq!(adjust, 0.0);
            }
        }
    }
}
