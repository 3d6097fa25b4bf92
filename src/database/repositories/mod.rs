//! Postgres implementations of the store traits.

pub mod forecast_value;
pub mod metric_value;

pub use forecast_value::ForecastValueRepository;
pub use metric_value::MetricValueRepository;
