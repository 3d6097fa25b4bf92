pub mod adjust;
pub mod blend;
pub mod config;
#[cfg(feature = "db")]
pub mod database;
pub mod domain;
pub mod error;
pub mod national;
pub mod store;
pub mod telemetry;

pub use adjust::{add_adjust_to_forecasts, AdjustSettings};
pub use blend::{get_blend_forecast_values_latest, BlendOutcome, BlendRequest, WeightSchedule};
pub use error::{DatamodelError, Result};
pub use national::make_national_forecast;
pub use store::{ForecastValueStore, InMemoryStore, MetricValueStore};
