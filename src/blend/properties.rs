//! Re-centre percentile bands on the blended value.
//!
//! Bands are taken from one model. They are first made relative to that
//! model's own value and then shifted onto the blended value, so p10 and p90
//! still surround what is served.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{BlendedForecastValue, ForecastValueRecord, Properties};

/// Percentile offsets of the properties model, keyed by target time.
fn property_offsets(
    records: &[ForecastValueRecord],
    properties_model: &str,
) -> HashMap<DateTime<Utc>, Properties> {
    records
        .iter()
        .filter(|r| r.model_name == properties_model)
        .filter_map(|r| {
            let properties = r.properties.as_ref()?;
            let offsets = properties
                .iter()
                .map(|(label, v)| (label.clone(), v - r.expected_power_generation_megawatts))
                .collect();
            Some((r.target_time, offsets))
        })
        .collect()
}

/// Set `properties` on each blended value from `properties_model`.
///
/// Clears them when no model is given.
pub fn add_properties_to_forecast_values(
    blended: &mut [BlendedForecastValue],
    records: &[ForecastValueRecord],
    properties_model: Option<&str>,
) {
    let Some(properties_model) = properties_model else {
        for value in blended.iter_mut() {
            value.properties = None;
        }
        return;
    };

    debug!(properties_model, "adding properties to blended forecast values");
    let offsets = property_offsets(records, properties_model);

    for value in blended.iter_mut() {
        let megawatts = value.expected_power_generation_megawatts;
        value.properties = offsets.get(&value.target_time).map(|offsets| {
            offsets
                .iter()
                .map(|(label, offset)| (label.clone(), offset + megawatts))
                .filter(|(_, v)| v.is_finite())
                .collect()
        });
    }
}
