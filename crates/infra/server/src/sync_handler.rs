//! `POST /sync`: the admin-triggered sync endpoint. Admission order mirrors
//! §4.H: bearer auth, then body size (enforced again at the router layer via
//! `RequestBodyLimitLayer`, ahead of this handler ever seeing the body), then
//! `app_key` format, then a rate limit keyed on the bearer token rather than
//! `app_key` — unlike the webhook endpoint, a single operator credential may
//! drive syncs for many apps.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use supasaasy_core::traits::{EntityStore, SyncStateStore};
use supasaasy_core::types::SyncMode;
use supasaasy_connectors::ConnectorRegistry;
use supasaasy_jobs::JobManager;
use supasaasy_rate_limiter::RateLimiter;
use supasaasy_sync_engine::PaginatedSyncEngine;
use supasaasy_webhooks::admission::{check_body_size, is_valid_app_key, MAX_BODY_BYTES};

use crate::error::{constant_time_eq, ServerError, ServerResult};
use crate::sync_runner::{resolve_resource_types, run_resource_sync};

pub struct SyncHandlerState {
    pub registry: Arc<ConnectorRegistry>,
    pub entity_store: Arc<dyn EntityStore>,
    pub sync_state_store: Arc<dyn SyncStateStore>,
    pub job_manager: Arc<JobManager>,
    pub engine: Arc<PaginatedSyncEngine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub admin_api_key: String,
    pub admin_rate_limit_per_minute: u32,
    /// `false` runs requested resource types inline and responds `200` with
    /// the aggregated result; `true` enqueues a durable job and responds
    /// `202` with `{ job_id }`.
    pub durable: bool,
    /// Gates connector config validation: a directly-supplied secret is
    /// rejected outright rather than merely warned about.
    pub production: bool,
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    app_key: String,
    #[serde(default)]
    mode: Option<SyncMode>,
    #[serde(default)]
    resource_types: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct SyncResultResponse {
    success: bool,
    created: u64,
    updated: u64,
    deleted: u64,
    errors: u64,
    error_messages: Vec<String>,
    duration_ms: u64,
}

#[tracing::instrument(skip(state, headers, body))]
pub async fn handle_sync(
    State(state): State<Arc<SyncHandlerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match process_sync(&state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &ServerError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(json!({ "error": err.public_message() }))).into_response();
    if let ServerError::RateLimited { retry_after_seconds } = err {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_seconds));
    }
    response
}

async fn process_sync(state: &SyncHandlerState, headers: &HeaderMap, body: &[u8]) -> ServerResult<Response> {
    check_bearer(headers, &state.admin_api_key)?;

    check_body_size(None, body.len()).map_err(|_| ServerError::PayloadTooLarge {
        limit_bytes: MAX_BODY_BYTES as usize,
    })?;

    let request: SyncRequest =
        serde_json::from_slice(body).map_err(|e| ServerError::InvalidBody(e.to_string()))?;

    if !is_valid_app_key(&request.app_key) {
        return Err(ServerError::InvalidAppKey);
    }

    let rate_limit_key = bearer_token(headers).unwrap_or_default();
    match state.rate_limiter.check(&rate_limit_key, state.admin_rate_limit_per_minute).await {
        supasaasy_rate_limiter::Decision::Allow => {}
        supasaasy_rate_limiter::Decision::Deny { retry_after_seconds } => {
            return Err(ServerError::RateLimited { retry_after_seconds });
        }
    }

    let (app_config, connector) = state.registry.resolve(&request.app_key).await?;

    let config_errors = connector.validate_config(&app_config.config, state.production);
    if !config_errors.is_empty() {
        return Err(ServerError::ConfigInvalid(config_errors));
    }

    let mode = request.mode.unwrap_or(SyncMode::Incremental);
    let resource_types =
        resolve_resource_types(connector.as_ref(), &app_config.config, request.resource_types, mode);

    if state.durable {
        let (job, _tasks) = state
            .job_manager
            .create_job(request.app_key.clone(), mode, resource_types)
            .await?;
        return Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job.job_id }))).into_response());
    }

    let mut response = SyncResultResponse {
        success: true,
        created: 0,
        updated: 0,
        deleted: 0,
        errors: 0,
        error_messages: Vec::new(),
        duration_ms: 0,
    };
    for resource_type in resource_types {
        let result = run_resource_sync(
            &state.engine,
            state.entity_store.as_ref(),
            state.sync_state_store.as_ref(),
            connector.as_ref(),
            &request.app_key,
            &app_config.config,
            &resource_type,
            mode,
        )
        .await;
        response.success &= result.success;
        response.created += result.counters.created;
        response.updated += result.counters.updated;
        response.deleted += result.counters.deleted;
        response.errors += result.counters.errors;
        response.error_messages.extend(result.error_messages);
        response.duration_ms += result.duration_ms;
    }

    Ok((StatusCode::OK, Json(response)).into_response())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn check_bearer(headers: &HeaderMap, admin_api_key: &str) -> ServerResult<()> {
    match bearer_token(headers) {
        Some(token) if constant_time_eq(token.as_bytes(), admin_api_key.as_bytes()) => Ok(()),
        _ => Err(ServerError::Unauthorized),
    }
}
