//! Admission pipeline: the ordered checks a webhook request must clear
//! before the handler ever resolves a connector or reads the payload.
//!
//! Steps 1–4 (method, `app_key` format, body size, rate limit) are pure and
//! independent of any particular connector, so they live here as free
//! functions the handler calls in order; steps 5–8 need a resolved
//! connector and are driven directly by [`crate::handler`].

use axum::http::Method;

use supasaasy_rate_limiter::{Decision, RateLimiter};

use crate::error::{WebhookError, WebhookResult};

/// Maximum accepted request body, per the admission table's step 3.
pub const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// `app_key` must be non-empty and match `^[A-Za-z0-9_-]+$`.
pub fn is_valid_app_key(app_key: &str) -> bool {
    !app_key.is_empty()
        && app_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Step 1: only `POST` is admitted.
pub fn check_method(method: &Method) -> WebhookResult<()> {
    if method == Method::POST {
        Ok(())
    } else {
        Err(WebhookError::MethodNotAllowed)
    }
}

/// Step 2: `app_key` format.
pub fn check_app_key_format(app_key: &str) -> WebhookResult<()> {
    if is_valid_app_key(app_key) {
        Ok(())
    } else {
        Err(WebhookError::InvalidAppKey)
    }
}

/// Step 3: body size, checked against both the declared `Content-Length`
/// (so a truthful oversized request is rejected without reading it in full)
/// and the body actually received.
pub fn check_body_size(content_length: Option<u64>, actual_len: usize) -> WebhookResult<()> {
    let limit_bytes = MAX_BODY_BYTES as usize;
    if content_length.is_some_and(|declared| declared > MAX_BODY_BYTES) {
        return Err(WebhookError::PayloadTooLarge { limit_bytes });
    }
    if actual_len > limit_bytes {
        return Err(WebhookError::PayloadTooLarge { limit_bytes });
    }
    Ok(())
}

/// Step 4: fixed-window rate limit keyed on `app_key`.
pub async fn check_rate_limit(
    limiter: &RateLimiter,
    app_key: &str,
    limit_per_minute: u32,
) -> WebhookResult<()> {
    match limiter.check(app_key, limit_per_minute).await {
        Decision::Allow => Ok(()),
        Decision::Deny { retry_after_seconds } => {
            Err(WebhookError::RateLimited { retry_after_seconds })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alnum_underscore_dash() {
        assert!(is_valid_app_key("stripe_test-01"));
    }

    #[test]
    fn rejects_space_and_empty() {
        assert!(!is_valid_app_key("bad key!"));
        assert!(!is_valid_app_key(""));
    }

    #[test]
    fn method_other_than_post_is_rejected() {
        assert!(check_method(&Method::GET).is_err());
        assert!(check_method(&Method::POST).is_ok());
    }

    #[test]
    fn oversized_declared_or_actual_body_is_rejected() {
        assert!(check_body_size(Some(2 * 1024 * 1024), 10).is_err());
        assert!(check_body_size(None, 2 * 1024 * 1024).is_err());
        assert!(check_body_size(Some(10), 10).is_ok());
    }

    #[tokio::test]
    async fn rate_limit_denies_after_threshold_and_reports_retry_after() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(check_rate_limit(&limiter, "app_1", 5).await.is_ok());
        }
        match check_rate_limit(&limiter, "app_1", 5).await {
            Err(WebhookError::RateLimited { retry_after_seconds }) => {
                assert!(retry_after_seconds > 0 && retry_after_seconds <= 60)
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
