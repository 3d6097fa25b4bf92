//! Blend forecasts of several models into one series
//!
//! 1. build the weight table from the schedule
//! 2. read the latest forecast values of each model
//! 3. blend them per target time
//! 4. re-centre the percentile bands of the properties model

pub mod collect;
pub mod merge;
pub mod properties;
pub mod weights;

pub use collect::*;
pub use merge::*;
pub use properties::*;
pub use weights::*;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::domain::BlendedForecastValue;
use crate::error::{DatamodelError, Result};
use crate::store::ForecastValueStore;

pub const DEFAULT_MODEL_NAMES: [&str; 2] = ["cnn", "National_xg"];

/// What to blend for one GSP.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendRequest {
    pub gsp_id: i32,
    /// Only target times from here on; also anchors the weight table.
    pub start_datetime: Option<DateTime<Utc>>,
    /// Only target times up to and including this one.
    pub end_datetime: Option<DateTime<Utc>>,
    /// Models in weight-vector order. Defaults to [`DEFAULT_MODEL_NAMES`].
    pub model_names: Option<Vec<String>>,
    /// Defaults to [`WeightSchedule::default`].
    pub weights: Option<WeightSchedule>,
    /// Blend values made this long before their target time, with one fixed set of weights.
    pub forecast_horizon_minutes: Option<i64>,
    /// Model whose percentile bands are carried over.
    pub properties_model: Option<String>,
    pub stale_after: Option<Duration>,
}

impl BlendRequest {
    pub fn new(gsp_id: i32) -> Self {
        Self {
            gsp_id,
            ..Self::default()
        }
    }

    pub fn start_datetime(mut self, start_datetime: DateTime<Utc>) -> Self {
        self.start_datetime = Some(start_datetime);
        self
    }

    pub fn end_datetime(mut self, end_datetime: DateTime<Utc>) -> Self {
        self.end_datetime = Some(end_datetime);
        self
    }

    pub fn model_names<S: AsRef<str>>(mut self, model_names: &[S]) -> Self {
        self.model_names = Some(model_names.iter().map(|m| m.as_ref().to_string()).collect());
        self
    }

    pub fn weights(mut self, weights: WeightSchedule) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn forecast_horizon_minutes(mut self, minutes: i64) -> Self {
        self.forecast_horizon_minutes = Some(minutes);
        self
    }

    pub fn properties_model(mut self, model_name: &str) -> Self {
        self.properties_model = Some(model_name.to_string());
        self
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    fn resolved_model_names(&self) -> Vec<String> {
        self.model_names
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL_NAMES.iter().map(|m| m.to_string()).collect())
    }
}

/// Blended series plus the target times that could not be blended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendOutcome {
    /// Ordered by target time, never negative.
    pub values: Vec<BlendedForecastValue>,
    pub skipped: Vec<DateTime<Utc>>,
}

/// Read the latest forecast of each requested model and blend them for `request.gsp_id`.
///
/// `now` anchors the weight schedule and the freshness check.
pub async fn get_blend_forecast_values_latest(
    store: &dyn ForecastValueStore,
    request: &BlendRequest,
    now: DateTime<Utc>,
) -> Result<BlendOutcome> {
    info!(
        gsp_id = request.gsp_id,
        start_datetime = ?request.start_datetime,
        end_datetime = ?request.end_datetime,
        "getting blend forecast"
    );

    let model_names = request.resolved_model_names();

    if let Some(properties_model) = &request.properties_model {
        if !model_names.contains(properties_model) {
            return Err(DatamodelError::UnknownPropertiesModel {
                model: properties_model.clone(),
                model_names,
            });
        }
    }

    let weights = if model_names.len() > 1 {
        let schedule = request.weights.clone().unwrap_or_default();
        Some(make_weights_table(
            &model_names,
            &schedule,
            request.start_datetime,
            request.forecast_horizon_minutes,
            now,
        )?)
    } else {
        None
    };

    let collected = collect_forecast_values(
        store,
        request.gsp_id,
        &model_names,
        request.start_datetime,
        request.end_datetime,
        request.forecast_horizon_minutes,
    )
    .await?;
    if collected.is_empty() {
        return Err(DatamodelError::NoForecastValues {
            gsp_id: request.gsp_id,
            model_names,
        });
    }

    let collected = filter_stale_forecasts(collected, now, request.stale_after);
    let records = flatten_forecast_values(&collected);

    let BlendResult { mut values, skipped } = blend_forecasts_together(&records, weights.as_ref());
    if !skipped.is_empty() {
        warn!(
            gsp_id = request.gsp_id,
            count = skipped.len(),
            "some target times could not be blended"
        );
    }

    add_properties_to_forecast_values(&mut values, &records, request.properties_model.as_deref());

    Ok(BlendOutcome {
        values: finalize_blended_values(values),
        skipped,
    })
}
