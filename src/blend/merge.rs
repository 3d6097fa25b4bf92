//! Merge the forecast values of several models into one series.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{debug, warn};

use super::weights::WeightTable;
use crate::domain::{BlendedForecastValue, ForecastValueRecord};

/// Blended values plus the target times that could not be blended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendResult {
    pub values: Vec<BlendedForecastValue>,
    /// Target times with values from several models but no schedule row giving them weight.
    pub skipped: Vec<DateTime<Utc>>,
}

fn pass_through(record: &ForecastValueRecord) -> BlendedForecastValue {
    BlendedForecastValue {
        target_time: record.target_time,
        expected_power_generation_megawatts: record.expected_power_generation_megawatts,
        adjust_mw: record.adjust_mw,
        properties: None,
        weight: 1.0,
    }
}

/// Weighted mean of value and adjust_mw for one target time.
///
/// Models without a weight count as zero. Returns `None` when no weight mass
/// is left. NaN products are left out of the sums, the weight still counts.
pub fn blend_one_target_time<F>(
    target_time: DateTime<Utc>,
    records: &[&ForecastValueRecord],
    weight_of: F,
) -> Option<BlendedForecastValue>
where
    F: Fn(&str) -> f64,
{
    let mut total_weight = 0.0;
    let mut value = 0.0;
    let mut adjust_mw = 0.0;

    for record in records {
        let weight = weight_of(record.model_name.as_str());
        total_weight += weight;

        let weighted_value = record.expected_power_generation_megawatts * weight;
        if !weighted_value.is_nan() {
            value += weighted_value;
        }
        let weighted_adjust = record.adjust_mw * weight;
        if !weighted_adjust.is_nan() {
            adjust_mw += weighted_adjust;
        }
    }

    if total_weight <= 0.0 {
        return None;
    }

    Some(BlendedForecastValue {
        target_time,
        expected_power_generation_megawatts: value / total_weight,
        adjust_mw: adjust_mw / total_weight,
        properties: None,
        weight: total_weight,
    })
}

/// Walk forward through the weight table until a row gives the models some weight.
fn blend_with_next_weights(
    target_time: DateTime<Utc>,
    records: &[&ForecastValueRecord],
    weights: &WeightTable,
) -> Option<BlendedForecastValue> {
    weights.rows_after(target_time).find_map(|(weights_time, row)| {
        debug!(%target_time, %weights_time, "trying later weights");
        blend_one_target_time(target_time, records, |model| {
            weights.index_of(model).map_or(0.0, |i| row[i])
        })
    })
}

/// Blend records from all models into one value per target time.
///
/// Target times with a single model pass through unchanged. Where several
/// models overlap, a model holding the full weight is used as is; otherwise
/// the values are weighted with the table row for that time, falling back to
/// the first later row that gives them any weight.
pub fn blend_forecasts_together(
    records: &[ForecastValueRecord],
    weights: Option<&WeightTable>,
) -> BlendResult {
    let mut sorted: Vec<&ForecastValueRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.target_time);

    let groups = sorted.into_iter().chunk_by(|r| r.target_time);
    let mut result = BlendResult::default();

    for (target_time, group) in &groups {
        let group: Vec<&ForecastValueRecord> = group.collect();

        if let [record] = group.as_slice() {
            result.values.push(pass_through(record));
            continue;
        }

        debug!(%target_time, count = group.len(), "blending forecasts");
        let weight_of = |model: &str| {
            weights
                .and_then(|w| w.weight(model, target_time))
                .unwrap_or(0.0)
        };

        if let Some(dominant) = group.iter().find(|r| weight_of(r.model_name.as_str()) == 1.0) {
            debug!(%target_time, model_name = %dominant.model_name, "single model has full weight");
            result.values.push(pass_through(dominant));
            continue;
        }

        let blended = blend_one_target_time(target_time, &group, weight_of).or_else(|| {
            debug!(%target_time, "weights add to zero, looking at later weights");
            weights.and_then(|w| blend_with_next_weights(target_time, &group, w))
        });

        match blended {
            Some(value) => result.values.push(value),
            None => {
                warn!(
                    %target_time,
                    "no weights available to blend forecasts, skipping target time"
                );
                result.skipped.push(target_time);
            }
        }
    }

    result
}

/// Clamp negative values to zero and drop values that are missing.
pub fn finalize_blended_values(values: Vec<BlendedForecastValue>) -> Vec<BlendedForecastValue> {
    values
        .into_iter()
        .filter_map(|mut value| {
            if value.expected_power_generation_megawatts.is_nan() {
                debug!(target_time = %value.target_time, "dropping missing value");
                return None;
            }
            if value.expected_power_generation_megawatts < 0.0 {
                value.expected_power_generation_megawatts = 0.0;
            }
            Some(value)
        })
        .collect()
}
