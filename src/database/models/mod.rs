//! Rows as read from Postgres, converted to domain records before they leave the database module.

pub mod forecast_value;
pub mod metric_value;

pub use forecast_value::ForecastValueRow;
pub use metric_value::MetricValueRow;
