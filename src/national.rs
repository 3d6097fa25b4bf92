//! Sum GSP forecasts into a national one.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{debug, info};

use crate::domain::{Forecast, ForecastValue, NATIONAL_GSP_ID};
use crate::error::{DatamodelError, Result};

#[derive(Debug, Default)]
struct Totals {
    megawatts: f64,
    adjust_mw: f64,
    count: usize,
}

/// Add up the forecasts of `n_gsps` distinct GSPs per target time.
///
/// Every target time must have a value from every GSP. Model name and
/// creation time are taken from the first forecast.
pub fn make_national_forecast(forecasts: &[Forecast], n_gsps: usize) -> Result<Forecast> {
    info!(count = forecasts.len(), n_gsps, "making national forecast");

    if forecasts.len() != n_gsps {
        return Err(DatamodelError::NationalForecast(format!(
            "got {} forecasts, expected {n_gsps}",
            forecasts.len()
        )));
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<i32> = forecasts
        .iter()
        .map(|f| f.gsp_id)
        .filter(|gsp_id| !seen.insert(*gsp_id))
        .unique()
        .collect();
    if !duplicates.is_empty() {
        return Err(DatamodelError::NationalForecast(format!(
            "found non unique GSP ids {duplicates:?}"
        )));
    }

    let mut totals: BTreeMap<DateTime<Utc>, Totals> = BTreeMap::new();
    for value in forecasts.iter().flat_map(|f| &f.forecast_values) {
        let total = totals.entry(value.target_time).or_default();
        total.megawatts += value.expected_power_generation_megawatts;
        total.adjust_mw += value.adjust_mw;
        total.count += 1;
    }

    if let Some((target_time, total)) = totals.iter().find(|(_, t)| t.count != n_gsps) {
        return Err(DatamodelError::NationalForecast(format!(
            "{target_time} has {} values, expected {n_gsps}",
            total.count
        )));
    }
    debug!(target_times = totals.len(), "summed GSP forecasts");

    let first = forecasts
        .first()
        .ok_or_else(|| DatamodelError::NationalForecast("no forecasts to sum".into()))?;

    let forecast_values = totals
        .into_iter()
        .map(|(target_time, total)| ForecastValue {
            adjust_mw: total.adjust_mw,
            ..ForecastValue::new(target_time, total.megawatts)
        })
        .collect();

    Ok(Forecast {
        gsp_id: NATIONAL_GSP_ID,
        model_name: first.model_name.clone(),
        forecast_creation_time: first.forecast_creation_time,
        forecast_values,
    })
}
