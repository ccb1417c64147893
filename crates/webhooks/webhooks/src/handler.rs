//! Axum entry point for `POST /webhook/{app_key}`: wires admission,
//! connector resolution, signature verification, parsing, and dispatch into
//! a single route, logging every terminal response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use supasaasy_connectors::ConnectorRegistry;
use supasaasy_core::error::CoreError;
use supasaasy_core::traits::{EntityStore, WebhookLogStore};
use supasaasy_core::types::WebhookLog;
use supasaasy_rate_limiter::RateLimiter;

use crate::admission::{check_app_key_format, check_body_size, check_method, check_rate_limit, MAX_BODY_BYTES};
use crate::dispatch::{dispatch_event, event_type_str};
use crate::error::{WebhookError, WebhookResult};
use crate::redact::redact_headers;

/// Shared state for the webhook router. Built once at startup and cloned
/// (cheaply, via `Arc`) into the axum router.
pub struct WebhookState {
    pub registry: Arc<ConnectorRegistry>,
    pub entity_store: Arc<dyn EntityStore>,
    pub log_store: Arc<dyn WebhookLogStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limit_per_minute: u32,
    /// Gates connector config validation: a directly-supplied secret is
    /// rejected outright rather than merely warned about.
    pub production: bool,
}

/// Builds the `POST /webhook/{app_key}` router. A `RequestBodyLimitLayer`
/// enforces the admission size cap at the transport level, ahead of the
/// handler ever materializing the body into memory.
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook/{app_key}", post(handle_webhook).options(handle_preflight))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            MAX_BODY_BYTES as usize,
        ))
        .with_state(state)
}

/// Minimal `OPTIONS` response: no `Access-Control-Allow-Origin` is ever
/// emitted, so no origin — wildcard or otherwise — is granted CORS access.
async fn handle_preflight() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
struct WebhookOkResponse {
    ok: bool,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
}

#[tracing::instrument(skip(state, headers, body), fields(app_key = %app_key))]
pub async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    Path(app_key): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let header_map = headers_to_map(&headers);
    let content_length = headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let result = process(&state, &method, &app_key, &header_map, content_length, &body).await;

    let retry_after_seconds = match &result {
        Err(WebhookError::RateLimited { retry_after_seconds }) => Some(*retry_after_seconds),
        _ => None,
    };

    let (status, response_body, error_detail) = match &result {
        Ok(ok) => (
            StatusCode::OK,
            serde_json::to_value(ok).unwrap_or(Value::Null),
            None,
        ),
        Err(err) => (
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            serde_json::json!({ "error": err.public_message() }),
            Some(err.to_string()),
        ),
    };

    log_request(
        &state,
        &app_key,
        method.as_str(),
        &header_map,
        &body,
        status.as_u16(),
        &response_body,
        error_detail,
        started.elapsed().as_millis() as u64,
    )
    .await;

    let mut response = (status, Json(response_body)).into_response();
    if let Some(seconds) = retry_after_seconds {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    }
    response
}

/// Steps 1–8 of the admission/dispatch pipeline, as one function so every
/// early return is a single exit point (no step N+1 effect runs once step N
/// has failed).
async fn process(
    state: &WebhookState,
    method: &Method,
    app_key: &str,
    headers: &HashMap<String, String>,
    content_length: Option<u64>,
    body: &[u8],
) -> WebhookResult<WebhookOkResponse> {
    check_method(method)?;
    check_app_key_format(app_key)?;
    check_body_size(content_length, body.len())?;
    check_rate_limit(&state.rate_limiter, app_key, state.rate_limit_per_minute).await?;

    let (app_config, connector) = state.registry.resolve(app_key).await?;

    let config_errors = connector.validate_config(&app_config.config, state.production);
    if !config_errors.is_empty() {
        return Err(WebhookError::DispatchFailed(format!(
            "connector config invalid for '{app_key}': {config_errors:?}"
        )));
    }

    let secret = app_config
        .config
        .webhook_secret
        .resolve()
        .map_err(|key| CoreError::MissingSecret { key })?;
    connector.verify_signature(headers, body, &secret)?;

    let events = connector.parse_webhook(body)?;
    let event = events.first().ok_or_else(|| {
        WebhookError::ParseFailed("webhook payload contained no events".to_string())
    })?;

    let collection_key = connector.collection_key(&event.resource_type);
    let api_version = connector.metadata().api_version;
    let outcome = dispatch_event(
        state.entity_store.as_ref(),
        app_key,
        &collection_key,
        &api_version,
        event,
    )
    .await?;

    Ok(WebhookOkResponse {
        ok: true,
        event_type: event_type_str(outcome.event_type),
        external_id: Some(outcome.external_id),
    })
}

#[allow(clippy::too_many_arguments)]
async fn log_request(
    state: &WebhookState,
    app_key: &str,
    method: &str,
    headers: &HashMap<String, String>,
    body: &[u8],
    status: u16,
    response_body: &Value,
    error_detail: Option<String>,
    duration_ms: u64,
) {
    let request_body = if body.len() <= WebhookLog::MAX_BODY_BYTES {
        serde_json::from_slice::<Value>(body).ok()
    } else {
        None
    };

    let entry = WebhookLog {
        id: uuid::Uuid::new_v4().to_string(),
        app_key: app_key.to_string(),
        request_method: method.to_string(),
        request_path: format!("/webhook/{app_key}"),
        request_headers: redact_headers(headers),
        request_body,
        response_status: status,
        response_body: Some(response_body.clone()),
        error_message: error_detail,
        processing_duration_ms: duration_ms,
        created_at: chrono::Utc::now(),
    };

    // Never let a log-store failure affect the response already computed
    // above; only surface it on the internal tracing channel.
    if let Err(err) = state.log_store.append(entry).await {
        tracing::error!(app_key, error = %err, "webhook log insert failed");
    }
}

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("").to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tower::ServiceExt;

    use supasaasy_adapter_memory::{InMemoryEntityStore, InMemoryWebhookLogStore};
    use supasaasy_connectors::ConnectorRegistry;
    use supasaasy_core::error::CoreResult;
    use supasaasy_core::traits::{Connector, ConnectorPage};
    use supasaasy_core::types::{
        AppConfig, ConnectorAppConfig, ConnectorMetadata, EntityKey, NormalizedEntity,
        ParsedWebhookEvent, ResourceDescriptor, SecretRef, WebhookEventType,
    };

    /// Always-valid test connector: every signature verifies, and
    /// `parse_webhook` interprets the body as `{event_type, external_id}`.
    struct EchoConnector;

    #[async_trait]
    impl Connector for EchoConnector {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn metadata(&self) -> ConnectorMetadata {
            ConnectorMetadata {
                name: "echo".into(),
                display_name: "Echo".into(),
                version: "0.0.0".into(),
                api_version: "1".into(),
                supported_resources: vec![ResourceDescriptor {
                    resource_type: "customer".into(),
                    collection_key: "echo_customer".into(),
                    supports_incremental: false,
                    supports_webhooks: true,
                }],
            }
        }

        fn resource_types(&self) -> &[&'static str] {
            &["customer"]
        }

        fn validate_config(&self, _config: &ConnectorAppConfig, _production: bool) -> Vec<String> {
            Vec::new()
        }

        async fn list_page(
            &self,
            _app_key: &str,
            _app_config: &ConnectorAppConfig,
            _resource_type: &str,
            _cursor: Option<&str>,
            _since: Option<DateTime<Utc>>,
        ) -> CoreResult<ConnectorPage> {
            Ok(ConnectorPage {
                items: Vec::<NormalizedEntity>::new(),
                next_cursor: None,
            })
        }

        fn verify_signature(
            &self,
            _headers: &HashMap<String, String>,
            _raw_body: &[u8],
            secret: &str,
        ) -> CoreResult<()> {
            if secret == "whsec_test" {
                Ok(())
            } else {
                Err(CoreError::InvalidSignature)
            }
        }

        fn parse_webhook(&self, raw_body: &[u8]) -> CoreResult<Vec<ParsedWebhookEvent>> {
            let body: Value = serde_json::from_slice(raw_body)?;
            let event_type = match body["event_type"].as_str().unwrap_or("create") {
                "update" => WebhookEventType::Update,
                "delete" => WebhookEventType::Delete,
                "archive" => WebhookEventType::Archive,
                _ => WebhookEventType::Create,
            };
            Ok(vec![ParsedWebhookEvent {
                event_type,
                original_event_type: "customer.event".to_string(),
                resource_type: "customer".to_string(),
                external_id: body["external_id"].as_str().unwrap_or_default().to_string(),
                data: body.clone(),
                timestamp: Utc::now(),
                metadata: HashMap::new(),
            }])
        }
    }

    async fn test_state() -> (Arc<WebhookState>, Arc<InMemoryEntityStore>) {
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(EchoConnector));
        registry
            .load_apps(vec![AppConfig {
                app_key: "echo_test".into(),
                name: "Echo Test".into(),
                connector: "echo".into(),
                config: ConnectorAppConfig {
                    api_key: SecretRef::Direct("key".into()),
                    webhook_secret: SecretRef::Direct("whsec_test".into()),
                    sync_from: None,
                    sync_resources: None,
                },
            }])
            .await;

        let entity_store = Arc::new(InMemoryEntityStore::new());
        let state = Arc::new(WebhookState {
            registry: Arc::new(registry),
            entity_store: entity_store.clone(),
            log_store: Arc::new(InMemoryWebhookLogStore::new(100)),
            rate_limiter: Arc::new(RateLimiter::new()),
            rate_limit_per_minute: 100,
            production: false,
        });
        (state, entity_store)
    }

    #[tokio::test]
    async fn create_event_upserts_and_returns_200() {
        let (state, entity_store) = test_state().await;
        let app = router(state);

        let body = json!({"event_type": "create", "external_id": "cus_1"}).to_string();
        let response = app
            .oneshot(
                Request::post("/webhook/echo_test")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let key = EntityKey {
            app_key: "echo_test".into(),
            collection_key: "echo_customer".into(),
            external_id: "cus_1".into(),
        };
        assert!(entity_store.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_app_key_is_404() {
        let (state, _) = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::post("/webhook/missing_app")
                    .body(Body::from(json!({"external_id": "x"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_app_key_format_is_400() {
        let (state, _) = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::post("/webhook/bad%20key")
                    .body(Body::from(json!({"external_id": "x"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_post_method_is_405() {
        let (state, _) = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(Request::get("/webhook/echo_test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn preflight_request_gets_no_cors_headers() {
        let (state, _) = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/webhook/echo_test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }

    #[tokio::test]
    async fn rate_limit_exceeded_returns_429_with_retry_after() {
        let (state, _) = test_state().await;
        let limited_state = WebhookState {
            registry: state.registry.clone(),
            entity_store: state.entity_store.clone(),
            log_store: state.log_store.clone(),
            rate_limiter: state.rate_limiter.clone(),
            rate_limit_per_minute: 1,
            production: state.production,
        };
        let app = router(Arc::new(limited_state));

        let make_req = || {
            Request::post("/webhook/echo_test")
                .body(Body::from(
                    json!({"event_type": "create", "external_id": "cus_1"}).to_string(),
                ))
                .unwrap()
        };

        let first = app.clone().oneshot(make_req()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(make_req()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
