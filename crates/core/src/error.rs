use thiserror::Error;

pub type DataLayerResult<T> = Result<T, DataLayerError>;

#[derive(Error, Debug)]
pub enum DataLayerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid component data on {element}: {reason}")]
    InvalidComponentData { element: String, reason: String },

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for DataLayerError {
    fn from(err: config::ConfigError) -> Self {
        DataLayerError::Config(err.to_string())
    }
}
