//! Maps a verified, parsed webhook event onto entity store mutations.

use supasaasy_core::error::CoreResult;
use supasaasy_core::traits::EntityStore;
use supasaasy_core::types::{EntityKey, NormalizedEntity, ParsedWebhookEvent, WebhookEventType};

/// The provider-agnostic string form of an event type, used in the `200`
/// response body and in logs.
pub fn event_type_str(event_type: WebhookEventType) -> &'static str {
    match event_type {
        WebhookEventType::Create => "create",
        WebhookEventType::Update => "update",
        WebhookEventType::Delete => "delete",
        WebhookEventType::Archive => "archive",
    }
}

/// Builds the entity store's input shape from a parsed event. `create`,
/// `update`, and `archive` all route through the same upsert path; only
/// `archive` stamps `archived_at`.
pub fn extract_entity(
    app_key: &str,
    collection_key: &str,
    api_version: &str,
    event: &ParsedWebhookEvent,
) -> NormalizedEntity {
    NormalizedEntity {
        external_id: event.external_id.clone(),
        app_key: app_key.to_string(),
        collection_key: collection_key.to_string(),
        api_version: api_version.to_string(),
        raw_payload: event.data.clone(),
        archived_at: matches!(event.event_type, WebhookEventType::Archive).then_some(event.timestamp),
    }
}

/// Outcome of dispatching one event, shaping the `200` response body.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub event_type: WebhookEventType,
    pub external_id: String,
}

/// Applies one parsed event to the entity store: `create`/`update`/`archive`
/// upsert; `delete` removes the row. Absence of the row on delete is not an
/// error — at-least-once delivery means a duplicate delete is routine.
pub async fn dispatch_event(
    entity_store: &dyn EntityStore,
    app_key: &str,
    collection_key: &str,
    api_version: &str,
    event: &ParsedWebhookEvent,
) -> CoreResult<DispatchOutcome> {
    match event.event_type {
        WebhookEventType::Delete => {
            let key = EntityKey {
                app_key: app_key.to_string(),
                collection_key: collection_key.to_string(),
                external_id: event.external_id.clone(),
            };
            entity_store.delete(&key).await?;
        }
        WebhookEventType::Create | WebhookEventType::Update | WebhookEventType::Archive => {
            let normalized = extract_entity(app_key, collection_key, api_version, event);
            entity_store.upsert(normalized).await?;
        }
    }

    Ok(DispatchOutcome {
        event_type: event.event_type,
        external_id: event.external_id.clone(),
    })
}
