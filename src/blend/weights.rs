//! Blend weights over the forecast horizon
//!
//! A [`WeightSchedule`] describes, per horizon segment, how the weight of each
//! model moves from a start vector to an end vector. [`make_weights_table`]
//! expands it into a half-hourly [`WeightTable`] anchored at the next
//! half-hour boundary after `now`.
//!
//! Point evaluation of a schedule treats segments as `[start, end)`. A horizon
//! before the first segment takes that segment's start weights, a horizon at or
//! after the end of the last segment takes its end weights, and a horizon that
//! falls in a gap between segments has no weights at all.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DatamodelError, Result};

/// Horizon at which the table stops; the last half hour before it is included.
pub const BLEND_HORIZON_HOURS: u32 = 8;

fn step() -> Duration {
    Duration::minutes(30)
}

/// One piece of the schedule. Weight vectors are aligned with the model names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeightSegment", into = "RawWeightSegment")]
pub struct WeightSegment {
    pub start_horizon_hour: u32,
    pub end_horizon_hour: u32,
    pub start_weight: Vec<f64>,
    pub end_weight: Vec<f64>,
}

/// Serialized form, where horizons default to `0..8` and a missing weight
/// vector repeats the other one.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawWeightSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_horizon_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_horizon_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_weight: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_weight: Option<Vec<f64>>,
}

impl TryFrom<RawWeightSegment> for WeightSegment {
    type Error = String;

    fn try_from(raw: RawWeightSegment) -> std::result::Result<Self, Self::Error> {
        let (start_weight, end_weight) = match (raw.start_weight, raw.end_weight) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start.clone(), start),
            (None, Some(end)) => (end.clone(), end),
            (None, None) => return Err("segment needs start_weight or end_weight".to_string()),
        };
        Ok(Self {
            start_horizon_hour: raw.start_horizon_hour.unwrap_or(0),
            end_horizon_hour: raw.end_horizon_hour.unwrap_or(BLEND_HORIZON_HOURS),
            start_weight,
            end_weight,
        })
    }
}

impl From<WeightSegment> for RawWeightSegment {
    fn from(segment: WeightSegment) -> Self {
        Self {
            start_horizon_hour: Some(segment.start_horizon_hour),
            end_horizon_hour: Some(segment.end_horizon_hour),
            start_weight: Some(segment.start_weight),
            end_weight: Some(segment.end_weight),
        }
    }
}

impl WeightSegment {
    pub fn new(
        start_horizon_hour: u32,
        end_horizon_hour: u32,
        start_weight: Vec<f64>,
        end_weight: Vec<f64>,
    ) -> Self {
        Self {
            start_horizon_hour,
            end_horizon_hour,
            start_weight,
            end_weight,
        }
    }

    fn contains(&self, horizon_hours: f64) -> bool {
        f64::from(self.start_horizon_hour) <= horizon_hours
            && horizon_hours < f64::from(self.end_horizon_hour)
    }

    /// Linear interpolation at `fraction` of the way through the segment.
    fn interpolate(&self, fraction: f64) -> Vec<f64> {
        self.start_weight
            .iter()
            .zip(&self.end_weight)
            .map(|(start, end)| start + (end - start) * fraction)
            .collect()
    }

    fn weights_at(&self, horizon_hours: f64) -> Vec<f64> {
        let span = f64::from(self.end_horizon_hour) - f64::from(self.start_horizon_hour);
        if span <= 0.0 {
            return self.start_weight.clone();
        }
        self.interpolate((horizon_hours - f64::from(self.start_horizon_hour)) / span)
    }
}

/// Ordered, contiguous list of segments from short to long horizons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightSchedule(Vec<WeightSegment>);

impl Default for WeightSchedule {
    /// First model only up to 2 hours, linear hand-over until 6 hours, second model after.
    fn default() -> Self {
        Self(vec![
            WeightSegment::new(0, 2, vec![1.0, 0.0], vec![1.0, 0.0]),
            WeightSegment::new(2, 6, vec![1.0, 0.0], vec![0.0, 1.0]),
            WeightSegment::new(6, BLEND_HORIZON_HOURS, vec![0.0, 1.0], vec![0.0, 1.0]),
        ])
    }
}

impl WeightSchedule {
    pub fn new(segments: Vec<WeightSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[WeightSegment] {
        &self.0
    }

    /// Check the schedule against the number of models it will weight.
    pub fn validate(&self, n_models: usize) -> Result<()> {
        if self.0.is_empty() {
            return Err(DatamodelError::InvalidSchedule("schedule has no segments".into()));
        }
        let mut previous_start = 0;
        for (i, segment) in self.0.iter().enumerate() {
            if segment.start_weight.len() != n_models || segment.end_weight.len() != n_models {
                return Err(DatamodelError::InvalidSchedule(format!(
                    "segment {i} has {} start and {} end weights for {n_models} models",
                    segment.start_weight.len(),
                    segment.end_weight.len()
                )));
            }
            if segment.start_horizon_hour > segment.end_horizon_hour {
                return Err(DatamodelError::InvalidSchedule(format!(
                    "segment {i} starts at hour {} after it ends at hour {}",
                    segment.start_horizon_hour, segment.end_horizon_hour
                )));
            }
            if segment.start_horizon_hour < previous_start {
                return Err(DatamodelError::InvalidSchedule(format!(
                    "segment {i} is out of order"
                )));
            }
            previous_start = segment.start_horizon_hour;
        }
        Ok(())
    }

    /// Weights of each model for a single forecast horizon.
    pub fn weights_at(&self, horizon_hours: f64) -> Option<Vec<f64>> {
        let first = self.0.first()?;
        let last = self.0.last()?;

        if horizon_hours < f64::from(first.start_horizon_hour) {
            debug!(horizon_hours, "horizon before schedule, using first start weights");
            return Some(first.start_weight.clone());
        }
        if horizon_hours >= f64::from(last.end_horizon_hour) {
            debug!(horizon_hours, "horizon after schedule, using last end weights");
            return Some(last.end_weight.clone());
        }

        self.0
            .iter()
            .find(|segment| segment.contains(horizon_hours))
            .map(|segment| segment.weights_at(horizon_hours))
    }
}

/// Half-hourly blend weights, one row per timestamp, one column per model.
///
/// Rows are kept in time order so a caller can walk forward from a target
/// time.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    model_names: Vec<String>,
    rows: BTreeMap<DateTime<Utc>, Vec<f64>>,
}

impl WeightTable {
    pub fn model_names(&self) -> &[String] {
        &self.model_names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.rows.keys().copied()
    }

    pub fn index_of(&self, model_name: &str) -> Option<usize> {
        self.model_names.iter().position(|m| m == model_name)
    }

    pub fn row(&self, time: DateTime<Utc>) -> Option<&[f64]> {
        self.rows.get(&time).map(Vec::as_slice)
    }

    /// Weight of one model at one time, if the table covers it.
    pub fn weight(&self, model_name: &str, time: DateTime<Utc>) -> Option<f64> {
        let index = self.index_of(model_name)?;
        self.row(time).map(|row| row[index])
    }

    /// Rows strictly after `time`, earliest first.
    pub fn rows_after(
        &self,
        time: DateTime<Utc>,
    ) -> impl Iterator<Item = (DateTime<Utc>, &[f64])> + '_ {
        self.rows
            .range((std::ops::Bound::Excluded(time), std::ops::Bound::Unbounded))
            .map(|(t, row)| (*t, row.as_slice()))
    }
}

/// Round up to the next half-hour boundary, dropping seconds.
/// A time exactly on a boundary still moves to the next one.
pub fn next_half_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let into_hour = Duration::seconds(now.timestamp().rem_euclid(3600))
        + Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
    let hour_start = now - into_hour;
    if now.minute() >= 30 {
        hour_start + Duration::hours(1)
    } else {
        hour_start + step()
    }
}

fn half_hour_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut times = Vec::new();
    let mut t = start;
    while t <= end {
        times.push(t);
        t += step();
    }
    times
}

/// Expand `schedule` into a [`WeightTable`] from `start_datetime` out to the blend horizon.
///
/// Without `start_datetime` the table starts at the next half hour after `now`.
/// Times between `start_datetime` and that half hour get the first segment's
/// start weights. With `forecast_horizon_minutes`, every row carries the
/// schedule evaluated at that single horizon.
pub fn make_weights_table(
    model_names: &[String],
    schedule: &WeightSchedule,
    start_datetime: Option<DateTime<Utc>>,
    forecast_horizon_minutes: Option<i64>,
    now: DateTime<Utc>,
) -> Result<WeightTable> {
    schedule.validate(model_names.len())?;

    let reference = next_half_hour(now);
    let start_datetime = start_datetime.unwrap_or(reference);

    let fixed_weights = forecast_horizon_minutes.map(|minutes| {
        let horizon_hours = minutes as f64 / 60.0;
        let weights = schedule.weights_at(horizon_hours).unwrap_or_else(|| {
            warn!(minutes, "no schedule segment covers forecast horizon, using zero weights");
            vec![0.0; model_names.len()]
        });
        debug!(?weights, minutes, "fixed weights for forecast horizon");
        weights
    });

    let mut rows: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    for (i, segment) in schedule.segments().iter().enumerate() {
        let segment = match &fixed_weights {
            Some(weights) => WeightSegment {
                start_weight: weights.clone(),
                end_weight: weights.clone(),
                ..segment.clone()
            },
            None => segment.clone(),
        };

        if i == 0 {
            for t in half_hour_range(start_datetime, reference) {
                rows.entry(t).or_insert_with(|| segment.start_weight.clone());
            }
        }

        let mut segment_start =
            reference + Duration::hours(i64::from(segment.start_horizon_hour)) - step();
        if segment.start_horizon_hour == 0 {
            segment_start += step();
        }
        let mut segment_end =
            reference + Duration::hours(i64::from(segment.end_horizon_hour)) - step();
        if segment.end_horizon_hour == BLEND_HORIZON_HOURS {
            segment_end += step();
        }
        debug!(
            start = %segment_start,
            end = %segment_end,
            "making weights for hours {} to {}",
            segment.start_horizon_hour,
            segment.end_horizon_hour
        );

        // the end of a segment belongs to the next one
        let times = half_hour_range(segment_start, segment_end);
        let span = (segment_end - segment_start).num_seconds() as f64;
        for t in times.iter().take(times.len().saturating_sub(1)) {
            let fraction = (*t - segment_start).num_seconds() as f64 / span;
            rows.entry(*t).or_insert_with(|| segment.interpolate(fraction));
        }
    }

    rows.retain(|t, _| *t >= start_datetime);

    Ok(WeightTable {
        model_names: model_names.to_vec(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn names() -> Vec<String> {
        vec!["test_1".to_string(), "test_2".to_string()]
    }

    fn frozen_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 1).unwrap()
    }

    fn nth(table: &WeightTable, n: usize) -> (DateTime<Utc>, Vec<f64>) {
        let t = table.times().nth(n).unwrap();
        (t, table.row(t).unwrap().to_vec())
    }

    #[test]
    fn test_next_half_hour() {
        let at = |h, m, s| Utc.with_ymd_and_hms(2023, 1, 1, h, m, s).unwrap();
        assert_eq!(next_half_hour(at(0, 0, 1)), at(0, 30, 0));
        assert_eq!(next_half_hour(at(0, 0, 0)), at(0, 30, 0));
        assert_eq!(next_half_hour(at(0, 29, 59)), at(0, 30, 0));
        assert_eq!(next_half_hour(at(0, 30, 0)), at(1, 0, 0));
        assert_eq!(next_half_hour(at(23, 45, 0)), at(0, 0, 0) + Duration::days(1));
    }

    #[test]
    fn test_default_table() {
        let table =
            make_weights_table(&names(), &WeightSchedule::default(), None, None, frozen_now())
                .unwrap();
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 30, 0).unwrap();

        assert_eq!(table.len(), 16);
        assert_eq!(nth(&table, 0), (start, vec![1.0, 0.0]));
        assert_eq!(nth(&table, 3).1, vec![1.0, 0.0]);
        assert_eq!(nth(&table, 7).1, vec![0.5, 0.5]);
        assert_eq!(nth(&table, 11).1, vec![0.0, 1.0]);
        assert_eq!(nth(&table, 15), (start + Duration::minutes(450), vec![0.0, 1.0]));
    }

    #[test]
    fn test_table_from_yesterday() {
        let now = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 1).unwrap();
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let table =
            make_weights_table(&names(), &WeightSchedule::default(), Some(start), None, now)
                .unwrap();

        assert_eq!(table.len(), 49 + 16);
        assert_eq!(nth(&table, 0), (start, vec![1.0, 0.0]));
        assert_eq!(nth(&table, 49).1, vec![1.0, 0.0]);
        assert_eq!(nth(&table, 49 + 3).1, vec![1.0, 0.0]);
        assert_eq!(nth(&table, 49 + 7).1, vec![0.5, 0.5]);
        assert_eq!(nth(&table, 49 + 11).1, vec![0.0, 1.0]);
        assert_eq!(nth(&table, 49 + 15).1, vec![0.0, 1.0]);
    }

    #[test]
    fn test_start_after_reference_truncates() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 4, 0, 0).unwrap();
        let table = make_weights_table(
            &names(),
            &WeightSchedule::default(),
            Some(start),
            None,
            frozen_now(),
        )
        .unwrap();
        assert_eq!(table.times().next(), Some(start));
        assert_eq!(table.row(start).unwrap(), &[0.5, 0.5]);
    }

    #[rstest]
    #[case(180, vec![0.75, 0.25])]
    #[case(240, vec![0.5, 0.5])]
    #[case(-1, vec![1.0, 0.0])]
    #[case(10_000, vec![0.0, 1.0])]
    fn test_fixed_forecast_horizon(#[case] minutes: i64, #[case] expected: Vec<f64>) {
        let table = make_weights_table(
            &names(),
            &WeightSchedule::default(),
            None,
            Some(minutes),
            frozen_now(),
        )
        .unwrap();
        assert_eq!(table.len(), 16);
        assert!(table.times().all(|t| table.row(t).unwrap() == expected.as_slice()));
    }

    #[rstest]
    #[case(0.0, vec![1.0, 0.0])]
    #[case(1.99, vec![1.0, 0.0])]
    #[case(2.0, vec![1.0, 0.0])]
    #[case(4.0, vec![0.5, 0.5])]
    #[case(6.0, vec![0.0, 1.0])]
    #[case(8.0, vec![0.0, 1.0])]
    #[case(-3.0, vec![1.0, 0.0])]
    #[case(100.0, vec![0.0, 1.0])]
    fn test_schedule_boundaries(#[case] hours: f64, #[case] expected: Vec<f64>) {
        assert_eq!(WeightSchedule::default().weights_at(hours), Some(expected));
    }

    #[test]
    fn test_boundary_belongs_to_later_segment() {
        let schedule = WeightSchedule::new(vec![
            WeightSegment::new(0, 2, vec![1.0, 0.0], vec![1.0, 0.0]),
            WeightSegment::new(2, 8, vec![0.0, 1.0], vec![0.0, 1.0]),
        ]);
        assert_eq!(schedule.weights_at(2.0), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_gap_has_no_weights() {
        let schedule = WeightSchedule::new(vec![
            WeightSegment::new(0, 2, vec![1.0, 0.0], vec![1.0, 0.0]),
            WeightSegment::new(4, 8, vec![0.0, 1.0], vec![0.0, 1.0]),
        ]);
        assert_eq!(schedule.weights_at(3.0), None);

        let table =
            make_weights_table(&names(), &schedule, None, Some(180), frozen_now()).unwrap();
        assert!(table.times().all(|t| table.row(t).unwrap() == [0.0, 0.0]));
    }

    #[test]
    fn test_weights_sum_to_one() {
        let table =
            make_weights_table(&names(), &WeightSchedule::default(), None, None, frozen_now())
                .unwrap();
        for t in table.times() {
            let sum: f64 = table.row(t).unwrap().iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "weights at {t} sum to {sum}");
        }
        assert_eq!(table.weight("test_1", nth(&table, 0).0), Some(1.0));
        assert_eq!(table.weight("other", nth(&table, 0).0), None);
        assert_eq!(table.len(), 16);
    }

    #[test]
    fn test_deterministic() {
        let a = make_weights_table(&names(), &WeightSchedule::default(), None, None, frozen_now());
        let b = make_weights_table(&names(), &WeightSchedule::default(), None, None, frozen_now());
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn test_mismatched_weights_fail() {
        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let schedule = WeightSchedule::default();
        let result = make_weights_table(&three, &schedule, None, None, frozen_now());
        assert!(matches!(result, Err(DatamodelError::InvalidSchedule(_))));
    }

    #[test]
    fn test_deserialize_sparse_segments() {
        let json = r#"[
            {"end_horizon_hour": 2, "end_weight": [1, 0]},
            {"start_horizon_hour": 2, "end_horizon_hour": 6,
             "start_weight": [1, 0], "end_weight": [0, 1]},
            {"start_horizon_hour": 6, "start_weight": [0, 1]}
        ]"#;
        let schedule: WeightSchedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule, WeightSchedule::default());

        let bad = r#"[{"end_horizon_hour": 2}]"#;
        assert!(serde_json::from_str::<WeightSchedule>(bad).is_err());
    }
}
