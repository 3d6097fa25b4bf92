use chrono::{DateTime, NaiveTime, Utc};
use sqlx::FromRow;

use crate::domain::MetricValue;

/// Metric value joined with its model name.
#[derive(Debug, Clone, FromRow)]
pub struct MetricValueRow {
    pub value: f64,
    pub time_of_day: Option<NaiveTime>,
    pub forecast_horizon_minutes: Option<i32>,
    pub number_of_data_points: i32,
    pub model_name: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl MetricValueRow {
    /// `None` for rows that are not bucketed by time of day and horizon.
    pub fn into_metric_value(self) -> Option<MetricValue> {
        Some(MetricValue {
            value: self.value,
            time_of_day: self.time_of_day?,
            forecast_horizon_minutes: self.forecast_horizon_minutes?,
            number_of_data_points: self.number_of_data_points,
            model_name: self.model_name,
            created_utc: self.created_utc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::postgres::{types::Oid, PgTypeInfo, Postgres};
    use sqlx::Type;

    const TIMESTAMPTZ: u32 = 1184;
    const TIME: u32 = 1083;
    const FLOAT8: u32 = 701;
    const INT4: u32 = 23;

    fn pg_type(oid: u32) -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(oid))
    }

    fn row() -> MetricValueRow {
        MetricValueRow {
            value: 12.5,
            time_of_day: NaiveTime::from_hms_opt(16, 30, 0),
            forecast_horizon_minutes: Some(60),
            number_of_data_points: 30,
            model_name: None,
            created_utc: Utc.with_ymd_and_hms(2023, 1, 9, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_row_to_metric_value() {
        let value = row().into_metric_value().unwrap();
        assert_eq!(value.created_utc, Utc.with_ymd_and_hms(2023, 1, 9, 0, 0, 0).unwrap());
        assert_eq!(value.slot().1, 60);
    }

    #[test]
    fn test_unbucketed_row_skipped() {
        let unbucketed = MetricValueRow {
            time_of_day: None,
            ..row()
        };
        assert!(unbucketed.into_metric_value().is_none());
    }

    #[test]
    fn test_field_types_match_metric_value_columns() {
        // created_utc is timestamptz, which a naive datetime cannot decode
        assert!(<DateTime<Utc> as Type<Postgres>>::compatible(&pg_type(TIMESTAMPTZ)));
        assert!(!<chrono::NaiveDateTime as Type<Postgres>>::compatible(&pg_type(TIMESTAMPTZ)));
        assert!(<NaiveTime as Type<Postgres>>::compatible(&pg_type(TIME)));
        assert!(<f64 as Type<Postgres>>::compatible(&pg_type(FLOAT8)));
        assert!(<i32 as Type<Postgres>>::compatible(&pg_type(INT4)));
    }
}
