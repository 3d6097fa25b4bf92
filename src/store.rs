//! Storage boundary for forecast values and metric statistics.
//!
//! The blend and adjust pipelines only talk to these traits. Postgres
//! implementations live in `database::repositories`; [`InMemoryStore`] backs
//! tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use strum::{AsRefStr, Display};

use crate::domain::{ForecastValueRecord, MetricValue};

/// Table a forecast value query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ForecastValueTable {
    /// One row per (gsp, model, target time), overwritten by every new forecast.
    #[strum(serialize = "forecast_value_latest")]
    Latest,
    /// Every value of the last seven days, needed to filter on forecast horizon.
    #[strum(serialize = "forecast_value_last_seven_days")]
    LastSevenDays,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastValueQuery {
    pub gsp_id: i32,
    pub model_name: String,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub forecast_horizon_minutes: Option<i64>,
}

impl ForecastValueQuery {
    pub fn new(gsp_id: i32, model_name: &str) -> Self {
        Self {
            gsp_id,
            model_name: model_name.to_string(),
            start_datetime: None,
            end_datetime: None,
            forecast_horizon_minutes: None,
        }
    }

    pub fn table(&self) -> ForecastValueTable {
        match self.forecast_horizon_minutes {
            Some(_) => ForecastValueTable::LastSevenDays,
            None => ForecastValueTable::Latest,
        }
    }

    /// Lower bound on `created_utc` that keeps the query on recent partitions.
    pub fn created_utc_floor(&self) -> Option<DateTime<Utc>> {
        self.start_datetime.map(|start| start - Duration::days(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub metric_name: String,
    pub model_name: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastValueStore: Send + Sync {
    /// Newest value per target time for one model and GSP, ordered by target time.
    async fn latest_forecast_values(
        &self,
        query: &ForecastValueQuery,
    ) -> Result<Vec<ForecastValueRecord>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricValueStore: Send + Sync {
    /// Newest value per (time of day, forecast horizon) slot.
    async fn latest_metric_values(&self, query: &MetricQuery) -> Result<Vec<MetricValue>>;
}

#[derive(Debug, Clone)]
struct StoredForecastValue {
    gsp_id: i32,
    record: ForecastValueRecord,
}

#[derive(Debug, Clone)]
struct StoredMetricValue {
    metric_name: String,
    value: MetricValue,
}

/// Store kept entirely in memory, with the same query semantics as Postgres.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    latest: Vec<StoredForecastValue>,
    last_seven_days: Vec<StoredForecastValue>,
    metrics: Vec<StoredMetricValue>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_latest(&mut self, gsp_id: i32, record: ForecastValueRecord) -> &mut Self {
        self.latest.push(StoredForecastValue { gsp_id, record });
        self
    }

    pub fn add_last_seven_days(&mut self, gsp_id: i32, record: ForecastValueRecord) -> &mut Self {
        self.last_seven_days.push(StoredForecastValue { gsp_id, record });
        self
    }

    pub fn add_metric_value(&mut self, metric_name: &str, value: MetricValue) -> &mut Self {
        self.metrics.push(StoredMetricValue {
            metric_name: metric_name.to_string(),
            value,
        });
        self
    }

    fn matches(query: &ForecastValueQuery, stored: &StoredForecastValue) -> bool {
        let record = &stored.record;
        if stored.gsp_id != query.gsp_id || record.model_name != query.model_name {
            return false;
        }
        if query.start_datetime.is_some_and(|start| record.target_time < start) {
            return false;
        }
        if query.created_utc_floor().is_some_and(|floor| record.created_utc < floor) {
            return false;
        }
        if query.end_datetime.is_some_and(|end| record.target_time > end) {
            return false;
        }
        match query.forecast_horizon_minutes {
            Some(minutes) => record.forecast_horizon_minutes() >= minutes,
            None => true,
        }
    }
}

#[async_trait]
impl ForecastValueStore for InMemoryStore {
    async fn latest_forecast_values(
        &self,
        query: &ForecastValueQuery,
    ) -> Result<Vec<ForecastValueRecord>> {
        let rows = match query.table() {
            ForecastValueTable::Latest => &self.latest,
            ForecastValueTable::LastSevenDays => &self.last_seven_days,
        };

        let mut records: Vec<ForecastValueRecord> = rows
            .iter()
            .filter(|stored| Self::matches(query, stored))
            .map(|stored| stored.record.clone())
            .collect();

        records.sort_by(|a, b| {
            a.target_time
                .cmp(&b.target_time)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        records.dedup_by_key(|r| r.target_time);
        Ok(records)
    }
}

#[async_trait]
impl MetricValueStore for InMemoryStore {
    async fn latest_metric_values(&self, query: &MetricQuery) -> Result<Vec<MetricValue>> {
        let values = self
            .metrics
            .iter()
            .filter(|stored| stored.metric_name == query.metric_name)
            .filter(|stored| match &query.model_name {
                Some(model) => stored.value.model_name.as_deref() == Some(model.as_str()),
                None => true,
            })
            .map(|stored| stored.value.clone())
            .collect();
        Ok(MetricValue::latest_per_slot(values))
    }
}
