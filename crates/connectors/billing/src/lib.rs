//! # supasaasy billing connector
//!
//! Stripe-shaped connector: customers and invoices, paginated listing via the
//! `starting_after` cursor convention, webhooks signed with a timestamped
//! HMAC-SHA256 scheme (`Stripe-Signature: t=...,v1=...`).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
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

const NAME: &str = "stripe";
const API_VERSION: &str = "2020-08-27";
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Billing connector implementation, shaped after Stripe's webhook and
/// list-API conventions.
pub struct StripeConnector {
    client: reqwest::Client,
}

impl StripeConnector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for StripeConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for StripeConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn metadata(&self) -> ConnectorMetadata {
        ConnectorMetadata {
            name: NAME.to_string(),
            display_name: "Stripe".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: API_VERSION.to_string(),
            supported_resources: vec![
                ResourceDescriptor {
                    resource_type: "customer".to_string(),
                    collection_key: self.collection_key("customer"),
                    supports_incremental: true,
                    supports_webhooks: true,
                },
                ResourceDescriptor {
                    resource_type: "invoice".to_string(),
                    collection_key: self.collection_key("invoice"),
                    supports_incremental: true,
                    supports_webhooks: true,
                },
            ],
        }
    }

    fn resource_types(&self) -> &[&'static str] {
        &["customer", "invoice"]
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

        let mut url = format!("https://api.stripe.com/v1/{resource_type}s?limit=100");
        if let Some(cursor) = cursor {
            url.push_str(&format!("&starting_after={cursor}"));
        }
        if let Some(since) = since {
            url.push_str(&format!("&created[gte]={}", since.timestamp()));
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

        let body: StripeListResponse =
            response
                .json()
                .await
                .map_err(|e| CoreError::InvalidPage {
                    connector: NAME.to_string(),
                    message: e.to_string(),
                })?;

        let collection_key = self.collection_key(resource_type);
        let next_cursor = if body.has_more {
            body.data
                .last()
                .and_then(|obj| obj.get("id"))
                .and_then(|id| id.as_str())
                .map(|id| id.to_string())
        } else {
            None
        };
        let items = body
            .data
            .into_iter()
            .filter_map(|obj| normalize_object(obj, &collection_key))
            .collect();

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
            .find(|(k, _)| k.eq_ignore_ascii_case("stripe-signature"))
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| CoreError::MissingSignatureHeader {
                header: "Stripe-Signature".to_string(),
            })?;

        let parts = parse_signature_header(header)?;
        let timestamp: i64 = parts
            .get("t")
            .and_then(|t| t.parse().ok())
            .ok_or(CoreError::InvalidSignature)?;
        let provided = parts.get("v1").ok_or(CoreError::InvalidSignature)?;

        if (Utc::now().timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(CoreError::InvalidSignature);
        }

        let expected = sign(secret, timestamp, raw_body);
        if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
            Ok(())
        } else {
            Err(CoreError::InvalidSignature)
        }
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> CoreResult<Vec<ParsedWebhookEvent>> {
        let envelope: StripeEventEnvelope = serde_json::from_slice(raw_body)?;

        let event_type = match envelope.event_type.as_str() {
            t if t.ends_with(".created") => WebhookEventType::Create,
            t if t.ends_with(".updated") => WebhookEventType::Update,
            t if t.ends_with(".deleted") => WebhookEventType::Delete,
            _ => WebhookEventType::Update,
        };

        let external_id = envelope
            .data
            .object
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::WebhookParseFailed {
                message: "missing data.object.id".to_string(),
            })?
            .to_string();

        let resource_type = envelope
            .event_type
            .split('.')
            .next()
            .unwrap_or("unknown")
            .to_string();

        let mut metadata = HashMap::new();
        metadata.insert("delivery_id".to_string(), envelope.id.clone());
        metadata.insert("api_version".to_string(), API_VERSION.to_string());

        Ok(vec![ParsedWebhookEvent {
            event_type,
            original_event_type: envelope.event_type,
            resource_type,
            external_id,
            data: envelope.data.object,
            timestamp: Utc
                .timestamp_opt(envelope.created, 0)
                .single()
                .unwrap_or_else(Utc::now),
            metadata,
        }])
    }
}

#[derive(serde::Deserialize)]
struct StripeEventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(serde::Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct StripeListResponse {
    data: Vec<serde_json::Value>,
    has_more: bool,
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

fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn parse_signature_header(header: &str) -> CoreResult<HashMap<&str, &str>> {
    let mut parts = HashMap::new();
    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        let key = kv.next().ok_or(CoreError::InvalidSignature)?;
        let value = kv.next().ok_or(CoreError::InvalidSignature)?;
        parts.insert(key, value);
    }
    Ok(parts)
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

#[cfg(test)]
mod tests {
    use super::*;
    use supasaasy_core::types::SecretRef;

    fn signed_body(secret: &str, timestamp: i64, body: &[u8]) -> HashMap<String, String> {
        let sig = sign(secret, timestamp, body);
        let mut headers = HashMap::new();
        headers.insert(
            "Stripe-Signature".to_string(),
            format!("t={timestamp},v1={sig}"),
        );
        headers
    }

    #[test]
    fn verify_signature_accepts_correctly_signed_payload() {
        let connector = StripeConnector::new();
        let body = br#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();
        let headers = signed_body("whsec_test", now, body);

        assert!(connector.verify_signature(&headers, body, "whsec_test").is_ok());
    }

    #[test]
    fn verify_signature_rejects_tampered_payload() {
        let connector = StripeConnector::new();
        let body = br#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();
        let headers = signed_body("whsec_test", now, body);

        let tampered = br#"{"id":"evt_2"}"#;
        assert!(connector
            .verify_signature(&headers, tampered, "whsec_test")
            .is_err());
    }

    #[test]
    fn verify_signature_rejects_expired_timestamp() {
        let connector = StripeConnector::new();
        let body = br#"{"id":"evt_1"}"#;
        let old = Utc::now().timestamp() - 3600;
        let headers = signed_body("whsec_test", old, body);

        assert!(connector
            .verify_signature(&headers, body, "whsec_test")
            .is_err());
    }

    #[test]
    fn parse_webhook_extracts_customer_created() {
        let connector = StripeConnector::new();
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "customer.created",
            "created": 1_700_000_000,
            "data": { "object": { "id": "cus_1", "email": "a@b.com" } }
        });
        let events = connector
            .parse_webhook(body.to_string().as_bytes())
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_id, "cus_1");
        assert_eq!(events[0].event_type, WebhookEventType::Create);
        assert_eq!(events[0].resource_type, "customer");
    }

    #[test]
    fn validate_config_flags_unknown_resource() {
        let connector = StripeConnector::new();
        let config = ConnectorAppConfig {
            api_key: SecretRef::Direct("sk_test".into()),
            webhook_secret: SecretRef::Direct("whsec_test".into()),
            sync_from: None,
            sync_resources: Some(vec!["contact".to_string()]),
        };
        let errors = connector.validate_config(&config, false);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("contact"));
    }

    #[test]
    fn validate_config_rejects_direct_secret_in_production() {
        let connector = StripeConnector::new();
        let config = ConnectorAppConfig {
            api_key: SecretRef::Direct("sk_test".into()),
            webhook_secret: SecretRef::Direct("whsec_test".into()),
            sync_from: None,
            sync_resources: None,
        };
        assert!(connector.validate_config(&config, false).is_empty());
        let errors = connector.validate_config(&config, true);
        assert_eq!(errors.len(), 2);
    }
}
