use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::database::models::ForecastValueRow;
use crate::domain::ForecastValueRecord;
use crate::store::{ForecastValueQuery, ForecastValueStore, ForecastValueTable};

const LATEST_SQL: &str = r#"
    SELECT DISTINCT ON (fv.target_time)
        fv.target_time,
        fv.expected_power_generation_megawatts::float8 AS expected_power_generation_megawatts,
        fv.adjust_mw::float8 AS adjust_mw,
        fv.properties,
        fv.created_utc,
        m.name AS model_name
    FROM forecast_value_latest fv
    JOIN model m ON fv.model_id = m.id
    WHERE fv.gsp_id = $1
      AND m.name = $2
      AND ($3::timestamptz IS NULL OR fv.target_time >= $3)
      AND ($4::timestamptz IS NULL OR fv.created_utc >= $4)
      AND ($5::timestamptz IS NULL OR fv.target_time <= $5)
    ORDER BY fv.target_time, fv.created_utc DESC
"#;

const LAST_SEVEN_DAYS_SQL: &str = r#"
    SELECT DISTINCT ON (fv.target_time)
        fv.target_time,
        fv.expected_power_generation_megawatts::float8 AS expected_power_generation_megawatts,
        fv.adjust_mw::float8 AS adjust_mw,
        fv.properties,
        fv.created_utc,
        m.name AS model_name
    FROM forecast_value_last_seven_days fv
    JOIN forecast f ON fv.forecast_id = f.id
    JOIN location l ON f.location_id = l.id
    JOIN model m ON f.model_id = m.id
    WHERE l.gsp_id = $1
      AND m.name = $2
      AND ($3::timestamptz IS NULL OR fv.target_time >= $3)
      AND ($4::timestamptz IS NULL OR fv.created_utc >= $4)
      AND ($5::timestamptz IS NULL OR fv.target_time <= $5)
      AND fv.target_time - fv.created_utc >= make_interval(mins => $6)
    ORDER BY fv.target_time, fv.created_utc DESC
"#;

/// Reads forecast values from the latest and seven-day tables.
pub struct ForecastValueRepository {
    pool: PgPool,
}

impl ForecastValueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ForecastValueStore for ForecastValueRepository {
    async fn latest_forecast_values(
        &self,
        query: &ForecastValueQuery,
    ) -> Result<Vec<ForecastValueRecord>> {
        let table = query.table();
        let sql = match table {
            ForecastValueTable::Latest => LATEST_SQL,
            ForecastValueTable::LastSevenDays => LAST_SEVEN_DAYS_SQL,
        };

        let mut statement = sqlx::query_as::<_, ForecastValueRow>(sql)
            .bind(query.gsp_id)
            .bind(&query.model_name)
            .bind(query.start_datetime)
            .bind(query.created_utc_floor())
            .bind(query.end_datetime);
        if let Some(minutes) = query.forecast_horizon_minutes {
            let minutes = i32::try_from(minutes).context("forecast_horizon_minutes out of range")?;
            statement = statement.bind(minutes);
        }

        let rows = statement
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch forecast values from {table}"))?;

        debug!(
            gsp_id = query.gsp_id,
            model_name = %query.model_name,
            %table,
            count = rows.len(),
            "fetched forecast values"
        );

        Ok(rows.into_iter().map(ForecastValueRecord::from).collect())
    }
}
