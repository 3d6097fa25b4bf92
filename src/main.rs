use anyhow::Result;
use chrono::Utc;
use nowcasting_datamodel::{
    adjust::{add_adjust_to_forecasts, AdjustSettings},
    blend::{get_blend_forecast_values_latest, BlendRequest},
    config::Config,
    database::{
        repositories::{ForecastValueRepository, MetricValueRepository},
        Database,
    },
    domain::{Forecast, ForecastValue},
    telemetry::init_tracing,
};
use tracing::{info, warn};

const BLEND_MODEL_NAME: &str = "blend";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let db = Database::new(&cfg.db).await?;
    let forecast_values = ForecastValueRepository::new(db.pool().clone());
    let metric_values = MetricValueRepository::new(db.pool().clone());

    let now = Utc::now();
    let request = BlendRequest::from(&cfg.blend);
    let outcome = get_blend_forecast_values_latest(&forecast_values, &request, now).await?;
    if !outcome.skipped.is_empty() {
        warn!(count = outcome.skipped.len(), "target times left out of the blend");
    }

    let mut forecasts = vec![Forecast {
        gsp_id: request.gsp_id,
        model_name: Some(BLEND_MODEL_NAME.to_string()),
        forecast_creation_time: now,
        forecast_values: outcome.values.into_iter().map(ForecastValue::from).collect(),
    }];
    forecasts[0].normalize(cfg.blend.installed_capacity_mw);

    let settings = AdjustSettings::from(&cfg.adjust);
    add_adjust_to_forecasts(&metric_values, &mut forecasts, &settings).await;

    info!(
        gsp_id = request.gsp_id,
        count = forecasts[0].forecast_values.len(),
        "blended forecast ready"
    );
    println!("{}", serde_json::to_string_pretty(&forecasts)?);

    db.close().await;
    Ok(())
}
