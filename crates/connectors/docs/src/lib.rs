//! # supasaasy docs connector
//!
//! Notion-shaped connector: pages, paginated listing via an opaque
//! `start_cursor`, webhooks signed with HMAC-SHA1 over the raw request body
//! read from an `X-Hub-Signature`-style header (`sha1=<hex digest>`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;

use supasaasy_core::error::{CoreError, CoreResult};
use supasaasy_core::traits::{Connector, ConnectorPage};
use supasaasy_core::types::{
    ConnectorAppConfig, ConnectorMetadata, NormalizedEntity, ParsedWebhookEvent,
    ResourceDescriptor, WebhookEventType,
};

type HmacSha1 = Hmac<Sha1>;

const NAME: &str = "notion";
const API_VERSION: &str = "2022-06-28";

/// Docs connector implementation, shaped after Notion's webhook and
/// list-API conventions.
pub struct NotionConnector {
    client: reqwest::Client,
}

impl NotionConnector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for NotionConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for NotionConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn metadata(&self) -> ConnectorMetadata {
        ConnectorMetadata {
            name: NAME.to_string(),
            display_name: "Notion".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: API_VERSION.to_string(),
            supported_resources: vec![ResourceDescriptor {
                resource_type: "page".to_string(),
                collection_key: self.collection_key("page"),
                supports_incremental: true,
                supports_webhooks: true,
            }],
        }
    }

    fn resource_types(&self) -> &[&'static str] {
        &["page"]
    }

    fn validate_config(&self, config: &ConnectorAppConfig, production: bool) -> Vec<String> {
        let mut errors = Vec::new();
        if config.api_key.resolve().is_err() {
            errors.push("config.api_key: secret could not be resolved".to_string());
        }
        if config.webhook_secret.resolve().is_err() {
            errors.push("config.webhook_secret: secret could not be resolved".to_string());
        }
        for (field, secret) in [("api_key", &config.api_key), ("webhook_secret", &config.webhook_secret)] {
            if secret.is_direct() {
                tracing::warn!(connector = NAME, field, "secret configured as a direct value rather than an env reference");
                if production {
                    errors.push(format!("config.{field}: direct secrets are rejected in production mode"));
                }
            }
        }
        if let Some(resources) = &config.sync_resources {
            for resource in resources {
                if !self.resource_types().contains(&resource.as_str()) {
                    errors.push(format!(
                        "config.sync_resources: unknown resource type '{resource}'"
                    ));
                }
            }
        }
        errors
    }

    async fn list_page(
        &self,
        _app_key: &str,
        app_config: &ConnectorAppConfig,
        resource_type: &str,
        cursor: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> CoreResult<ConnectorPage> {
        if resource_type != "page" {
            return Err(CoreError::InvalidPage {
                connector: NAME.to_string(),
                message: format!("unsupported resource type '{resource_type}'"),
            });
        }
        let api_key = app_config
            .api_key
            .resolve()
            .map_err(|e| CoreError::MissingSecret { key: e })?;

        let mut body = serde_json::json!({
            "filter": { "property": "object", "value": "page" },
            "page_size": 100,
        });
        if let Some(cursor) = cursor {
            body["start_cursor"] = serde_json::Value::String(cursor.to_string());
        }
        if let Some(since) = since {
            body["filter"]["timestamp"] = serde_json::Value::String("last_edited_time".into());
            body["filter"]["last_edited_time"] = serde_json::json!({ "on_or_after": since.to_rfc3339() });
        }

        let response = self
            .client
            .post("https://api.notion.com/v1/search")
            .bearer_auth(api_key)
            .header("Notion-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamRequestFailed {
                connector: NAME.to_string(),
                message: e.to_string(),
            })?;

        let parsed: NotionSearchResponse =
            response
                .json()
                .await
                .map_err(|e| CoreError::InvalidPage {
                    connector: NAME.to_string(),
                    message: e.to_string(),
                })?;

        let collection_key = self.collection_key(resource_type);
        let items = parsed
            .results
            .into_iter()
            .filter_map(|obj| normalize_object(obj, &collection_key))
            .collect();

        let next_cursor = if parsed.has_more {
            parsed.next_cursor
        } else {
            None
        };

        Ok(ConnectorPage { items, next_cursor })
    }

    fn verify_signature(
        &self,
        headers: &HashMap<String, String>,
        raw_body: &[u8],
        secret: &str,
    ) -> CoreResult<()> {
        let header = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("x-hub-signature"))
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| CoreError::MissingSignatureHeader {
                header: "X-Hub-Signature".to_string(),
            })?;

        let provided = header
            .strip_prefix("sha1=")
            .ok_or(CoreError::InvalidSignature)?;

        let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(raw_body);
        let expected = hex::encode(mac.finalize().into_bytes());

        if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
            Ok(())
        } else {
            Err(CoreError::InvalidSignature)
        }
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> CoreResult<Vec<ParsedWebhookEvent>> {
        let envelope: NotionWebhookEnvelope = serde_json::from_slice(raw_body)?;

        let event_type = match envelope.event_type.as_str() {
            "page.created" => WebhookEventType::Create,
            "page.deleted" => WebhookEventType::Delete,
            "page.content_updated" | "page.properties_updated" => WebhookEventType::Update,
            _ => WebhookEventType::Update,
        };

        let mut metadata = HashMap::new();
        metadata.insert("workspace_id".to_string(), envelope.workspace_id.clone());

        Ok(vec![ParsedWebhookEvent {
            event_type,
            original_event_type: envelope.event_type,
            resource_type: "page".to_string(),
            external_id: envelope.entity.id,
            data: envelope.data,
            timestamp: Utc::now(),
            metadata,
        }])
    }
}

#[derive(serde::Deserialize)]
struct NotionWebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(rename = "workspace_id")]
    workspace_id: String,
    entity: NotionEntityRef,
    data: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct NotionEntityRef {
    id: String,
}

#[derive(serde::Deserialize)]
struct NotionSearchResponse {
    results: Vec<serde_json::Value>,
    has_more: bool,
    next_cursor: Option<String>,
}

fn normalize_object(object: serde_json::Value, collection_key: &str) -> Option<NormalizedEntity> {
    let external_id = object.get("id")?.as_str()?.to_string();
    let archived_at = object
        .get("archived")
        .and_then(|v| v.as_bool())
        .filter(|archived| *archived)
        .map(|_| Utc::now());
    Some(NormalizedEntity {
        external_id,
        app_key: String::new(),
        collection_key: collection_key.to_string(),
        api_version: API_VERSION.to_string(),
        raw_payload: object,
        archived_at,
    })
}

/// Constant-time byte comparison; never short-circuits on length-matched input.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
