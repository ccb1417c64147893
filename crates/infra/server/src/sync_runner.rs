//! Orchestration glue shared by the inline `/sync` path, the durable worker
//! loop, and the cron scheduler: resolving which resource types to sync, and
//! running one `(app_key, resource_type)` sync to completion against the
//! watermark store.

use chrono::Utc;

use supasaasy_core::traits::{Connector, EntityStore, SyncStateStore};
use supasaasy_core::types::{ConnectorAppConfig, SyncMode, SyncState};
use supasaasy_sync_engine::{resolve_existing_ids, PaginatedSyncEngine, SyncOptions, SyncRunResult};

/// Resolves which resource types a sync should cover: an explicit request
/// wins, then the app's configured `sync_resources`, then every resource the
/// connector knows about. For incremental mode, resources that don't support
/// incremental sync are dropped from the list.
pub fn resolve_resource_types(
    connector: &dyn Connector,
    app_config: &ConnectorAppConfig,
    requested: Option<Vec<String>>,
    mode: SyncMode,
) -> Vec<String> {
    let candidates = requested.or_else(|| app_config.sync_resources.clone()).unwrap_or_else(|| {
        connector.resource_types().iter().map(|s| s.to_string()).collect()
    });

    if mode != SyncMode::Incremental {
        return candidates;
    }

    let meta = connector.metadata();
    candidates
        .into_iter()
        .filter(|rt| {
            meta.supported_resources
                .iter()
                .find(|r| &r.resource_type == rt)
                .map(|r| r.supports_incremental)
                .unwrap_or(true)
        })
        .collect()
}

/// Runs one `(app_key, resource_type)` sync to completion.
///
/// Implements the `incrementalSync` resolution rule: if a watermark exists
/// for this slice, sync incrementally from it; otherwise fall through to a
/// full sync (bounded by the app's configured `sync_from`, if any). On
/// success the watermark is advanced to the instant the run *started*, not
/// when it finished, so writes that land upstream mid-run are picked up by
/// the next cycle rather than silently skipped.
pub async fn run_resource_sync(
    engine: &PaginatedSyncEngine,
    entity_store: &dyn EntityStore,
    sync_state_store: &dyn SyncStateStore,
    connector: &dyn Connector,
    app_key: &str,
    app_config: &ConnectorAppConfig,
    resource_type: &str,
    mode: SyncMode,
) -> SyncRunResult {
    let collection_key = connector.collection_key(resource_type);
    let started_at = Utc::now();

    let watermark = if mode == SyncMode::Incremental {
        sync_state_store.get(app_key, &collection_key).await.ok().flatten()
    } else {
        None
    };

    let (since, existing_ids) = match watermark {
        Some(state) => (Some(state.last_synced_at), None),
        None => {
            let ids = resolve_existing_ids(entity_store, app_key, &collection_key, app_config.sync_from)
                .await
                .ok();
            (app_config.sync_from, ids)
        }
    };

    let options = SyncOptions { page_limit: None, since };
    let result = engine
        .run(connector, app_key, app_config, resource_type, None, existing_ids, options)
        .await;

    if result.success {
        let _ = sync_state_store
            .upsert(SyncState {
                app_key: app_key.to_string(),
                collection_key,
                last_synced_at: started_at,
                last_success_at: Utc::now(),
            })
            .await;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use supasaasy_adapter_memory::{InMemoryEntityStore, InMemorySyncStateStore};
    use supasaasy_core::error::CoreResult;
    use supasaasy_core::traits::ConnectorPage;
    use supasaasy_core::types::{
        ConnectorMetadata, NormalizedEntity, ParsedWebhookEvent, ResourceDescriptor, SecretRef,
    };

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn metadata(&self) -> ConnectorMetadata {
            ConnectorMetadata {
                name: "stub".into(),
                display_name: "Stub".into(),
                version: "0.1.0".into(),
                api_version: "1".into(),
                supported_resources: vec![
                    ResourceDescriptor {
                        resource_type: "customer".into(),
                        collection_key: "stub_customer".into(),
                        supports_incremental: true,
                        supports_webhooks: true,
                    },
                    ResourceDescriptor {
                        resource_type: "report".into(),
                        collection_key: "stub_report".into(),
                        supports_incremental: false,
                        supports_webhooks: false,
                    },
                ],
            }
        }

        fn resource_types(&self) -> &[&'static str] {
            &["customer", "report"]
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
            Ok(ConnectorPage { items: Vec::<NormalizedEntity>::new(), next_cursor: None })
        }

        fn verify_signature(
            &self,
            _headers: &HashMap<String, String>,
            _raw_body: &[u8],
            _secret: &str,
        ) -> CoreResult<()> {
            Ok(())
        }

        fn parse_webhook(&self, _raw_body: &[u8]) -> CoreResult<Vec<ParsedWebhookEvent>> {
            Ok(Vec::new())
        }
    }

    fn app_config() -> ConnectorAppConfig {
        ConnectorAppConfig {
            api_key: SecretRef::Direct("k".into()),
            webhook_secret: SecretRef::Direct("s".into()),
            sync_from: None,
            sync_resources: None,
        }
    }

    #[test]
    fn full_sync_requests_all_resources_regardless_of_incremental_support() {
        let connector = StubConnector;
        let resolved = resolve_resource_types(&connector, &app_config(), None, SyncMode::Full);
        assert_eq!(resolved, vec!["customer".to_string(), "report".to_string()]);
    }

    #[test]
    fn incremental_sync_drops_resources_without_support() {
        let connector = StubConnector;
        let resolved = resolve_resource_types(&connector, &app_config(), None, SyncMode::Incremental);
        assert_eq!(resolved, vec!["customer".to_string()]);
    }

    #[test]
    fn explicit_request_overrides_app_config_defaults() {
        let connector = StubConnector;
        let mut config = app_config();
        config.sync_resources = Some(vec!["report".to_string()]);
        let resolved = resolve_resource_types(
            &connector,
            &config,
            Some(vec!["customer".to_string()]),
            SyncMode::Full,
        );
        assert_eq!(resolved, vec!["customer".to_string()]);
    }

    #[tokio::test]
    async fn first_run_falls_through_to_full_sync_and_sets_watermark() {
        let entity_store = InMemoryEntityStore::new();
        let state_store = InMemorySyncStateStore::new();
        let engine = PaginatedSyncEngine::new(std::sync::Arc::new(InMemoryEntityStore::new()));
        let connector = StubConnector;

        let result = run_resource_sync(
            &engine,
            &entity_store,
            &state_store,
            &connector,
            "app_1",
            &app_config(),
            "customer",
            SyncMode::Incremental,
        )
        .await;

        assert!(result.success);
        assert!(state_store.get("app_1", "stub_customer").await.unwrap().is_some());
    }
}
