//! Error type for connector registration and resolution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("unknown connector: {0}")]
    UnknownConnector(String),

    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("connector configuration invalid for app '{app_key}': {errors:?}")]
    ConfigValidationFailed { app_key: String, errors: Vec<String> },
}

impl ConnectorError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownConnector(_) | Self::UnknownApp(_) => 404,
            Self::ConfigValidationFailed { .. } => 400,
        }
    }
}

pub type ConnectorRegistryResult<T> = Result<T, ConnectorError>;
