//! Fetch the latest forecast values of each model before blending.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::ForecastValueRecord;
use crate::error::Result;
use crate::store::{ForecastValueQuery, ForecastValueStore};

/// Forecast values of one model, ordered by target time.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelForecastValues {
    pub model_name: String,
    pub values: Vec<ForecastValueRecord>,
}

impl ModelForecastValues {
    fn newest_created_utc(&self) -> Option<DateTime<Utc>> {
        self.values.iter().map(|v| v.created_utc).max()
    }
}

/// Read each model's values for `gsp_id`. Models without values are left out.
pub async fn collect_forecast_values(
    store: &dyn ForecastValueStore,
    gsp_id: i32,
    model_names: &[String],
    start_datetime: Option<DateTime<Utc>>,
    end_datetime: Option<DateTime<Utc>>,
    forecast_horizon_minutes: Option<i64>,
) -> Result<Vec<ModelForecastValues>> {
    let mut collected = Vec::with_capacity(model_names.len());

    for model_name in model_names {
        let query = ForecastValueQuery {
            start_datetime,
            end_datetime,
            forecast_horizon_minutes,
            ..ForecastValueQuery::new(gsp_id, model_name)
        };
        let mut values = store.latest_forecast_values(&query).await?;

        if values.is_empty() {
            debug!(
                model_name = %model_name,
                gsp_id,
                ?start_datetime,
                ?end_datetime,
                "no forecast values for model"
            );
            continue;
        }

        debug!(model_name = %model_name, gsp_id, count = values.len(), "found forecast values");
        for value in &mut values {
            value.model_name.clone_from(model_name);
        }
        collected.push(ModelForecastValues {
            model_name: model_name.clone(),
            values,
        });
    }

    Ok(collected)
}

/// Drop models whose newest value is older than `stale_after`, unless every model is that old.
pub fn filter_stale_forecasts(
    models: Vec<ModelForecastValues>,
    now: DateTime<Utc>,
    stale_after: Option<Duration>,
) -> Vec<ModelForecastValues> {
    let Some(stale_after) = stale_after else {
        return models;
    };
    let cutoff = now - stale_after;
    let is_fresh = |m: &ModelForecastValues| m.newest_created_utc().is_some_and(|t| t >= cutoff);

    if !models.iter().any(|m| is_fresh(m)) {
        debug!(%cutoff, "all forecasts are stale, using all of them");
        return models;
    }

    models
        .into_iter()
        .filter(|m| {
            let fresh = is_fresh(m);
            if !fresh {
                debug!(model_name = %m.model_name, %cutoff, "forecast is stale, not using it");
            }
            fresh
        })
        .collect()
}

/// One flat list over all models, ordered by target time.
pub fn flatten_forecast_values(models: &[ModelForecastValues]) -> Vec<ForecastValueRecord> {
    let mut records: Vec<ForecastValueRecord> = models
        .iter()
        .flat_map(|m| m.values.iter().cloned())
        .collect();
    records.sort_by_key(|r| r.target_time);
    records
}
