//! Errors produced by the `/sync` and `/jobs` admin surface.
//!
//! Distinct from [`supasaasy_webhooks::WebhookError`]: the admin endpoints
//! have their own admission order (bearer auth first) and their own mapping
//! from `ConfigurationError` (400, field-specific) rather than the webhook
//! handler's (500, generic).

use thiserror::Error;

use supasaasy_connectors::ConnectorError;
use supasaasy_core::error::CoreError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("malformed request body: {0}")]
    InvalidBody(String),

    #[error("app_key must match ^[A-Za-z0-9_-]+$")]
    InvalidAppKey,

    #[error("payload exceeds maximum size of {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("invalid connector configuration: {0:?}")]
    ConfigInvalid(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::InvalidBody(_) | Self::InvalidAppKey | Self::ConfigInvalid(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::RateLimited { .. } => 429,
            Self::UnknownApp(_) => 404,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }

    /// Field-specific messages are safe to return for every variant here
    /// except `Internal` — admin callers are operators, not the public
    /// internet, but an internal error may still carry storage-layer detail
    /// we don't want to promise callers as a stable message.
    pub fn public_message(&self) -> String {
        if matches!(self, Self::Internal(_)) {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<ConnectorError> for ServerError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::UnknownConnector(name) => Self::UnknownApp(name),
            ConnectorError::UnknownApp(key) => Self::UnknownApp(key),
            ConnectorError::ConfigValidationFailed { errors, .. } => Self::ConfigInvalid(errors),
        }
    }
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Constant-time byte comparison for the admin bearer token. Mirrors the
/// comparison each connector runs over its webhook signature.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
