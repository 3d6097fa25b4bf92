use anyhow::{Context, Result};
use chrono::Duration;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use validator::Validate;

use crate::adjust::{AdjustSettings, DEFAULT_MAX_ADJUST_PERCENTAGE, DEFAULT_ME_METRIC_NAME};
use crate::blend::{BlendRequest, WeightSchedule, DEFAULT_MODEL_NAMES};
use crate::domain::NATIONAL_GSP_ID;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub db: DbConfig,
    #[serde(default)]
    #[validate(nested)]
    pub blend: BlendConfig,
    #[serde(default)]
    #[validate(nested)]
    pub adjust: AdjustConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DbConfig {
    #[validate(length(min = 1))]
    pub url: String,
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout_secs() -> u64 { 30 }
fn default_idle_timeout_secs() -> u64 { 600 }

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BlendConfig {
    #[serde(default)]
    pub gsp_id: i32,
    #[serde(default = "default_model_names")]
    #[validate(length(min = 1))]
    pub model_names: Vec<String>,
    pub properties_model: Option<String>,
    pub forecast_horizon_minutes: Option<i64>,
    pub weights: Option<WeightSchedule>,
    #[validate(range(min = 1))]
    pub stale_after_minutes: Option<i64>,
    /// Capacity of the blended location, for the normalized output value.
    #[validate(range(min = 0.0))]
    pub installed_capacity_mw: Option<f64>,
}

fn default_model_names() -> Vec<String> {
    DEFAULT_MODEL_NAMES.iter().map(|m| m.to_string()).collect()
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            gsp_id: NATIONAL_GSP_ID,
            model_names: default_model_names(),
            properties_model: None,
            forecast_horizon_minutes: None,
            weights: None,
            stale_after_minutes: None,
            installed_capacity_mw: None,
        }
    }
}

impl From<&BlendConfig> for BlendRequest {
    fn from(cfg: &BlendConfig) -> Self {
        Self {
            gsp_id: cfg.gsp_id,
            start_datetime: None,
            end_datetime: None,
            model_names: Some(cfg.model_names.clone()),
            weights: cfg.weights.clone(),
            forecast_horizon_minutes: cfg.forecast_horizon_minutes,
            properties_model: cfg.properties_model.clone(),
            stale_after: cfg.stale_after_minutes.map(Duration::minutes),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustConfig {
    #[serde(default = "default_metric_name")]
    #[validate(length(min = 1))]
    pub metric_name: String,
    pub model_name: Option<String>,
    #[serde(default = "default_max_adjust_percentage")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_adjust_percentage: f64,
}

fn default_metric_name() -> String { DEFAULT_ME_METRIC_NAME.to_string() }
fn default_max_adjust_percentage() -> f64 { DEFAULT_MAX_ADJUST_PERCENTAGE }

impl Default for AdjustConfig {
    fn default() -> Self {
        Self {
            metric_name: default_metric_name(),
            model_name: None,
            max_adjust_percentage: default_max_adjust_percentage(),
        }
    }
}

impl From<&AdjustConfig> for AdjustSettings {
    fn from(cfg: &AdjustConfig) -> Self {
        Self {
            metric_name: cfg.metric_name.clone(),
            model_name: cfg.model_name.clone(),
            max_adjust_percentage: cfg.max_adjust_percentage,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("NOWCASTING__").split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract().context("Failed to read configuration")?;
        cfg.validate().context("Invalid configuration")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults() {
        let cfg = load("[db]\nurl = \"postgres://localhost/forecasts\"").unwrap();
        assert_eq!(cfg.db.max_connections, 10);
        assert_eq!(cfg.blend.gsp_id, 0);
        assert_eq!(cfg.blend.model_names, vec!["cnn", "National_xg"]);
        assert_eq!(cfg.adjust.metric_name, "Half Hourly ME");
        assert_eq!(cfg.adjust.max_adjust_percentage, 0.1);
    }

    #[test]
    fn test_blend_section_to_request() {
        let cfg = load(
            r#"
            [db]
            url = "postgres://localhost/forecasts"

            [blend]
            gsp_id = 12
            model_names = ["pvnet", "cnn"]
            properties_model = "pvnet"
            stale_after_minutes = 120
            installed_capacity_mw = 13000.0

            [[blend.weights]]
            end_horizon_hour = 4
            start_weight = [1.0, 0.0]

            [[blend.weights]]
            start_horizon_hour = 4
            start_weight = [0.0, 1.0]
            "#,
        )
        .unwrap();

        let request = BlendRequest::from(&cfg.blend);
        assert_eq!(request.gsp_id, 12);
        assert_eq!(request.properties_model.as_deref(), Some("pvnet"));
        assert_eq!(request.stale_after, Some(Duration::hours(2)));
        assert_eq!(request.weights.unwrap().segments().len(), 2);
        assert!(request.end_datetime.is_none());
        assert_eq!(cfg.blend.installed_capacity_mw, Some(13000.0));
    }

    #[test]
    fn test_negative_installed_capacity_fails() {
        let result = load(
            "[db]\nurl = \"postgres://localhost/forecasts\"\n[blend]\ninstalled_capacity_mw = -1.0",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_adjust_percentage_out_of_range() {
        let result = load(
            "[db]\nurl = \"postgres://localhost/forecasts\"\n[adjust]\nmax_adjust_percentage = 1.5",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_db_url_fails() {
        assert!(load("[blend]\ngsp_id = 1").is_err());
    }
}
