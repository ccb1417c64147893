//! # supasaasy CRM connector
//!
//! HubSpot-shaped connector: contacts and companies, paginated listing via an
//! opaque `after` cursor, webhooks signed with an untimestamped HMAC-SHA256
//! scheme (`X-Hubspot-Signature: <hex digest>`), distinct from the billing
//! connector's timestamped scheme.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

use supasaasy_core::error::{CoreError, CoreResult};
use supasaasy_core::traits::{Connector, ConnectorPage};
use supasaasy_core::types::{
    ConnectorAppConfig, ConnectorMetadata, NormalizedEntity, ParsedWebhookEvent,
    ResourceDescriptor, WebhookEventType,
};

type HmacSha256 = Hmac<Sha256>;

const NAME: &str = "hubspot";
const API_VERSION: &str = "v3";

/// CRM connector implementation, shaped after HubSpot's webhook and
/// list-API conventions.
pub struct HubSpotConnector {
    client: reqwest::Client,
}

impl HubSpotConnector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HubSpotConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for HubSpotConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn metadata(&self) -> ConnectorMetadata {
        ConnectorMetadata {
            name: NAME.to_string(),
            display_name: "HubSpot".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: API_VERSION.to_string(),
            supported_resources: vec![
                ResourceDescriptor {
                    resource_type: "contact".to_string(),
                    collection_key: self.collection_key("contact"),
                    supports_incremental: true,
                    supports_webhooks: true,
                },
                ResourceDescriptor {
                    resource_type: "company".to_string(),
                    collection_key: self.collection_key("company"),
                    supports_incremental: true,
                    supports_webhooks: true,
                },
            ],
        }
    }

    fn resource_types(&self) -> &[&'static str] {
        &["contact", "company"]
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
        let api_key = app_config
            .api_key
            .resolve()
            .map_err(|e| CoreError::MissingSecret { key: e })?;

        let mut url = format!(
            "https://api.hubapi.com/crm/{API_VERSION}/objects/{resource_type}s?limit=100"
        );
        if let Some(cursor) = cursor {
            url.push_str(&format!("&after={cursor}"));
        }
        if let Some(since) = since {
            url.push_str(&format!("&lastmodifieddate__gte={}", since.timestamp_millis()));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamRequestFailed {
                connector: NAME.to_string(),
                message: e.to_string(),
            })?;

        let body: HubSpotListResponse =
            response
                .json()
                .await
                .map_err(|e| CoreError::InvalidPage {
                    connector: NAME.to_string(),
                    message: e.to_string(),
                })?;

        let collection_key = self.collection_key(resource_type);
        let items = body
            .results
            .into_iter()
            .filter_map(|obj| normalize_object(obj, &collection_key))
            .collect();

        Ok(ConnectorPage {
            items,
            next_cursor: body.paging.and_then(|p| p.next).map(|n| n.after),
        })
    }

    fn verify_signature(
        &self,
        headers: &HashMap<String, String>,
        raw_body: &[u8],
        secret: &str,
    ) -> CoreResult<()> {
        let header = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("x-hubspot-signature"))
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| CoreError::MissingSignatureHeader {
                header: "X-Hubspot-Signature".to_string(),
            })?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(raw_body);
        let expected = hex::encode(mac.finalize().into_bytes());

        if constant_time_eq(expected.as_bytes(), header.as_bytes()) {
            Ok(())
        } else {
            Err(CoreError::InvalidSignature)
        }
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> CoreResult<Vec<ParsedWebhookEvent>> {
        let notifications: Vec<HubSpotNotification> = serde_json::from_slice(raw_body)?;

        notifications
            .into_iter()
            .map(|n| {
                let event_type = match n.subscription_type.as_str() {
                    t if t.ends_with(".creation") => WebhookEventType::Create,
                    t if t.ends_with(".deletion") => WebhookEventType::Delete,
                    _ => WebhookEventType::Update,
                };
                let resource_type = n
                    .subscription_type
                    .split('.')
                    .next()
                    .unwrap_or("unknown")
                    .to_string();

                let mut metadata = HashMap::new();
                metadata.insert("event_id".to_string(), n.event_id.to_string());

                Ok(ParsedWebhookEvent {
                    event_type,
                    original_event_type: n.subscription_type,
                    resource_type,
                    external_id: n.object_id.to_string(),
                    data: n.property_name.map(serde_json::Value::String).unwrap_or(
                        serde_json::Value::Null,
                    ),
                    timestamp: chrono::DateTime::from_timestamp_millis(n.occurred_at)
                        .unwrap_or_else(Utc::now),
                    metadata,
                })
            })
            .collect()
    }
}

#[derive(serde::Deserialize)]
struct HubSpotNotification {
    #[serde(rename = "eventId")]
    event_id: i64,
    #[serde(rename = "subscriptionType")]
    subscription_type: String,
    #[serde(rename = "objectId")]
    object_id: i64,
    #[serde(rename = "propertyName")]
    property_name: Option<String>,
    #[serde(rename = "occurredAt")]
    occurred_at: i64,
}

#[derive(serde::Deserialize)]
struct HubSpotListResponse {
    results: Vec<serde_json::Value>,
    paging: Option<HubSpotPaging>,
}

#[derive(serde::Deserialize)]
struct HubSpotPaging {
    next: Option<HubSpotNextPage>,
}

#[derive(serde::Deserialize)]
struct HubSpotNextPage {
    after: String,
}

fn normalize_object(object: serde_json::Value, collection_key: &str) -> Option<NormalizedEntity> {
    let external_id = object.get("id")?.as_str()?.to_string();
    Some(NormalizedEntity {
        external_id,
        app_key: String::new(),
        collection_key: collection_key.to_string(),
        api_version: API_VERSION.to_string(),
        raw_payload: object,
        archived_at: None,
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
