//! Errors produced by the webhook admission pipeline.
//!
//! Distinct from [`supasaasy_core::error::CoreError`]: these carry the
//! specific HTTP semantics of a single admission step, rather than a
//! storage- or connector-level failure. A [`CoreError`] surfacing from a
//! downstream call (entity store, connector) is wrapped into the closest
//! matching variant here.

use thiserror::Error;

use supasaasy_connectors::ConnectorError;
use supasaasy_core::error::CoreError;

pub type WebhookResult<T> = Result<T, WebhookError>;

/// Admission-pipeline error, one variant per §4.G failure mode.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("app_key must match ^[A-Za-z0-9_-]+$")]
    InvalidAppKey,

    #[error("payload exceeds maximum size of {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("unknown app_key: {0}")]
    UnknownApp(String),

    #[error("webhook signature verification failed")]
    VerificationFailed,

    #[error("failed to parse webhook payload: {0}")]
    ParseFailed(String),

    #[error("dispatch failed: {0}")]
    DispatchFailed(String),
}

impl WebhookError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MethodNotAllowed => 405,
            Self::InvalidAppKey => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::RateLimited { .. } => 429,
            Self::UnknownApp(_) => 404,
            Self::VerificationFailed => 401,
            Self::ParseFailed(_) => 400,
            Self::DispatchFailed(_) => 500,
        }
    }

    /// The public-facing message for this error. 5xx variants never leak
    /// their detail; everything else is already a short, safe message.
    pub fn public_message(&self) -> String {
        if self.status_code() >= 500 {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<CoreError> for WebhookError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSignature | CoreError::MissingSignatureHeader { .. } => {
                Self::VerificationFailed
            }
            CoreError::WebhookParseFailed { message } => Self::ParseFailed(message),
            CoreError::UnknownApp { app_key } => Self::UnknownApp(app_key),
            CoreError::UnknownConnector { connector } => Self::UnknownApp(connector),
            other => Self::DispatchFailed(other.to_string()),
        }
    }
}

impl From<ConnectorError> for WebhookError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::UnknownApp(app_key) => Self::UnknownApp(app_key),
            ConnectorError::UnknownConnector(name) => Self::UnknownApp(name),
            ConnectorError::ConfigValidationFailed { app_key, errors } => {
                Self::DispatchFailed(format!("connector config invalid for '{app_key}': {errors:?}"))
            }
        }
    }
}
