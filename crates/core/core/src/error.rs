//! Error types for the supasaasy ingestion pipeline.
//!
//! This module defines the `CoreError` enum which represents all possible
//! errors that can occur across storage, sync, webhook, and connector
//! operations.

use thiserror::Error;

/// The main error type for supasaasy core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    // ==================== Storage Errors ====================
    /// A storage backend operation failed.
    #[error("storage error: {message}")]
    StorageError { message: String },

    /// The requested record was not found.
    #[error("not found: {entity} with {key}={value}")]
    NotFound {
        entity: String,
        key: String,
        value: String,
    },

    /// The unique `(app_key, collection_key, external_id)` constraint was violated.
    #[error("constraint violation: {entity} with {field}={value} already exists")]
    ConstraintViolation {
        entity: String,
        field: String,
        value: String,
    },

    // ==================== Sync Errors ====================
    /// A sync task failed partway through.
    #[error("sync task failed for resource '{resource_type}': {message}")]
    SyncTaskFailed {
        resource_type: String,
        message: String,
    },

    /// The connector returned a malformed page of results.
    #[error("invalid page from connector '{connector}': {message}")]
    InvalidPage { connector: String, message: String },

    // ==================== Webhook Errors ====================
    /// The webhook signature did not match the computed digest.
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// The webhook signature header was missing or malformed.
    #[error("missing or malformed signature header: {header}")]
    MissingSignatureHeader { header: String },

    /// The webhook body could not be parsed by the connector.
    #[error("failed to parse webhook payload: {message}")]
    WebhookParseFailed { message: String },

    /// The webhook body exceeded the admission size limit.
    #[error("webhook payload exceeds maximum size of {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    // ==================== Connector Errors ====================
    /// The named connector is not registered.
    #[error("unknown connector: {connector}")]
    UnknownConnector { connector: String },

    /// The named app_key has no configured connection.
    #[error("unknown app: {app_key}")]
    UnknownApp { app_key: String },

    /// A connector's upstream HTTP call failed.
    #[error("upstream request to '{connector}' failed: {message}")]
    UpstreamRequestFailed { connector: String, message: String },

    // ==================== Rate Limiting ====================
    /// Too many requests have been made within the current window.
    #[error("rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    // ==================== Configuration Errors ====================
    /// The configuration is invalid.
    #[error("configuration error: {message}")]
    ConfigurationError { message: String },

    /// A required secret could not be resolved.
    #[error("missing secret: {key}")]
    MissingSecret { key: String },

    // ==================== Internal Errors ====================
    /// An internal error occurred.
    #[error("internal error: {message}")]
    InternalError { message: String },

    /// Serialization/deserialization failed.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl CoreError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn not_found(
        entity: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn constraint_violation(
        entity: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            entity: entity.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Returns an HTTP status code appropriate for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSignature | Self::MissingSignatureHeader { .. } => 401,
            Self::UnknownConnector { .. } | Self::UnknownApp { .. } | Self::NotFound { .. } => 404,
            Self::ConstraintViolation { .. } => 409,
            Self::PayloadTooLarge { .. } => 413,
            Self::WebhookParseFailed { .. } | Self::InvalidPage { .. } => 422,
            Self::RateLimitExceeded { .. } => 429,
            _ => 500,
        }
    }
}

/// A Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            message: err.to_string(),
        }
    }
}
