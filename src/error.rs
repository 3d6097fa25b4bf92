use thiserror::Error;

/// Hard failures of the blend, adjust and aggregation pipelines.
///
/// Missing data is not an error here: a model without forecast values or a
/// time slot without ME statistics is logged and defaulted by the caller.
#[derive(Debug, Error)]
pub enum DatamodelError {
    #[error("Invalid weight schedule: {0}")]
    InvalidSchedule(String),

    #[error("properties_model {model} must be one of the model names {model_names:?}")]
    UnknownPropertiesModel {
        model: String,
        model_names: Vec<String>,
    },

    #[error("No forecast values found for gsp_id {gsp_id} from models {model_names:?}")]
    NoForecastValues {
        gsp_id: i32,
        model_names: Vec<String>,
    },

    #[error("National forecast error: {0}")]
    NationalForecast(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T, E = DatamodelError> = std::result::Result<T, E>;
