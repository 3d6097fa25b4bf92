use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::database::models::MetricValueRow;
use crate::domain::{MetricValue, NATIONAL_GSP_ID};
use crate::store::{MetricQuery, MetricValueStore};

/// Latest national value per (time of day, forecast horizon) slot.
const LATEST_NATIONAL_SQL: &str = r#"
    SELECT DISTINCT ON (mv.time_of_day, mv.forecast_horizon_minutes)
        mv.value::float8 AS value,
        mv.time_of_day,
        mv.forecast_horizon_minutes,
        mv.number_of_data_points,
        m.name AS model_name,
        mv.created_utc
    FROM metric_value mv
    JOIN metric me ON mv.metric_id = me.id
    JOIN location l ON mv.location_id = l.id
    LEFT JOIN model m ON mv.model_id = m.id
    WHERE me.name = $1
      AND l.gsp_id = $2
      AND ($3::text IS NULL OR m.name = $3)
      AND mv.time_of_day IS NOT NULL
      AND mv.forecast_horizon_minutes IS NOT NULL
    ORDER BY mv.time_of_day, mv.forecast_horizon_minutes, mv.created_utc DESC
"#;

pub struct MetricValueRepository {
    pool: PgPool,
}

impl MetricValueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricValueStore for MetricValueRepository {
    async fn latest_metric_values(&self, query: &MetricQuery) -> Result<Vec<MetricValue>> {
        let rows = sqlx::query_as::<_, MetricValueRow>(LATEST_NATIONAL_SQL)
            .bind(&query.metric_name)
            .bind(NATIONAL_GSP_ID)
            .bind(query.model_name.as_deref())
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch metric values for {}", query.metric_name))?;

        debug!(metric_name = %query.metric_name, count = rows.len(), "fetched metric values");

        Ok(rows
            .into_iter()
            .filter_map(MetricValueRow::into_metric_value)
            .collect())
    }
}
