//! # supasaasy sync engine
//!
//! Drives a [`Connector`]'s `list_page` loop to completion for one
//! `(app_key, resource_type)` pair, upserting every page into an
//! [`EntityStore`] and reconciling local rows that no longer appear
//! upstream.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use supasaasy_core::error::CoreResult;
use supasaasy_core::traits::{Connector, EntityStore};
use supasaasy_core::types::{ConnectorAppConfig, SyncCounters};

/// Caller-supplied limits for one sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Stop after fetching at most this many pages. `None` means run to
    /// exhaustion (`next_cursor` becomes `None`).
    pub page_limit: Option<u32>,
    /// Restricts upstream results to records changed at or after this
    /// instant. `None` requests a full sync.
    pub since: Option<DateTime<Utc>>,
}

/// Outcome of one [`PaginatedSyncEngine::run`] call.
#[derive(Debug, Clone, Default)]
pub struct SyncRunResult {
    pub success: bool,
    pub counters: SyncCounters,
    pub error_messages: Vec<String>,
    /// Cursor to resume from on the next call, if the run stopped due to
    /// `page_limit` rather than upstream exhaustion.
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub duration_ms: u64,
}

/// Drives one connector's paginated listing to completion for a single
/// resource type, upserting results and reconciling deletions.
pub struct PaginatedSyncEngine {
    entity_store: Arc<dyn EntityStore>,
}

impl PaginatedSyncEngine {
    pub fn new(entity_store: Arc<dyn EntityStore>) -> Self {
        Self { entity_store }
    }

    /// Runs a sync for `(app_key, resource_type)`, starting from `cursor`
    /// (`None` for the first page).
    ///
    /// `existing_ids` is the set of external_ids currently stored for this
    /// `(app_key, collection_key)` pair at the start of the run; entities
    /// seen upstream are removed from it as they're encountered, and
    /// whatever remains at the end (when the run reached full upstream
    /// exhaustion, i.e. not stopped early by `page_limit`) is deleted
    /// locally. Pass `None` to skip deletion reconciliation entirely —
    /// required whenever `options.since` is set, since an incremental page
    /// only ever sees a subset of upstream records.
    pub async fn run(
        &self,
        connector: &dyn Connector,
        app_key: &str,
        app_config: &ConnectorAppConfig,
        resource_type: &str,
        cursor: Option<String>,
        existing_ids: Option<HashSet<String>>,
        options: SyncOptions,
    ) -> SyncRunResult {
        let started = std::time::Instant::now();
        let collection_key = connector.collection_key(resource_type);

        let mut counters = SyncCounters::default();
        let mut error_messages = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut remaining = existing_ids;
        let mut cursor = cursor;
        let mut pages_fetched: u32 = 0;
        let mut has_more = true;
        let mut list_failed = false;

        loop {
            if let Some(limit) = options.page_limit {
                if pages_fetched >= limit {
                    break;
                }
            }

            let page = match connector
                .list_page(
                    app_key,
                    app_config,
                    resource_type,
                    cursor.as_deref(),
                    options.since,
                )
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(app_key, resource_type, error = %err, "sync page fetch failed");
                    error_messages.push(err.to_string());
                    list_failed = true;
                    has_more = false;
                    break;
                }
            };

            pages_fetched += 1;

            for mut item in page.items {
                if item.external_id.is_empty() {
                    counters.errors += 1;
                    error_messages.push(format!(
                        "{collection_key}: upstream record missing external_id"
                    ));
                    continue;
                }
                item.app_key = app_key.to_string();
                item.collection_key = collection_key.clone();
                seen_ids.insert(item.external_id.clone());

                match self.entity_store.upsert(item).await {
                    Ok((_, created)) => {
                        if created {
                            counters.created += 1;
                        } else {
                            counters.updated += 1;
                        }
                    }
                    Err(err) => {
                        counters.errors += 1;
                        error_messages.push(err.to_string());
                    }
                }
            }

            cursor = page.next_cursor;
            has_more = cursor.is_some();
            if !has_more {
                break;
            }
        }

        if !list_failed && !has_more {
            if let Some(ref mut remaining) = remaining {
                for id in &seen_ids {
                    remaining.remove(id);
                }
                for stale_id in remaining.iter() {
                    let key = supasaasy_core::types::EntityKey {
                        app_key: app_key.to_string(),
                        collection_key: collection_key.clone(),
                        external_id: stale_id.clone(),
                    };
                    match self.entity_store.delete(&key).await {
                        Ok(true) => counters.deleted += 1,
                        Ok(false) => {}
                        Err(err) => {
                            counters.errors += 1;
                            error_messages.push(err.to_string());
                        }
                    }
                }
            }
        }

        SyncRunResult {
            success: !list_failed,
            counters,
            error_messages,
            next_cursor: cursor,
            has_more,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Resolves the `existing_ids` set an engine run should reconcile against,
/// honoring `sync_from` windowing: when a window is active, only rows
/// created within it are eligible for reconciliation, since older rows were
/// never in scope for this run to have seen.
pub async fn resolve_existing_ids(
    entity_store: &dyn EntityStore,
    app_key: &str,
    collection_key: &str,
    since: Option<DateTime<Utc>>,
) -> CoreResult<HashSet<String>> {
    let ids = match since {
        Some(since) => {
            entity_store
                .list_external_ids_created_after(app_key, collection_key, since)
                .await?
        }
        None => entity_store.list_external_ids(app_key, collection_key).await?,
    };
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use supasaasy_adapter_memory::InMemoryEntityStore;
    use supasaasy_core::error::{CoreError, CoreResult};
    use supasaasy_core::traits::ConnectorPage;
    use supasaasy_core::types::{
        ConnectorMetadata, NormalizedEntity, ParsedWebhookEvent, ResourceDescriptor, SecretRef,
    };

    /// Connector stub that serves pre-scripted pages, one per call.
    struct ScriptedConnector {
        pages: Mutex<Vec<CoreResult<ConnectorPage>>>,
    }

    impl ScriptedConnector {
        fn new(pages: Vec<CoreResult<ConnectorPage>>) -> Self {
            Self {
                pages: Mutex::new(pages),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn metadata(&self) -> ConnectorMetadata {
            ConnectorMetadata {
                name: "stub".into(),
                display_name: "Stub".into(),
                version: "0.0.0".into(),
                api_version: "1".into(),
                supported_resources: vec![ResourceDescriptor {
                    resource_type: "widget".into(),
                    collection_key: "stub_widget".into(),
                    supports_incremental: true,
                    supports_webhooks: false,
                }],
            }
        }

        fn resource_types(&self) -> &[&'static str] {
            &["widget"]
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
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return Ok(ConnectorPage {
                    items: Vec::new(),
                    next_cursor: None,
                });
            }
            pages.remove(0)
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

    fn item(external_id: &str) -> NormalizedEntity {
        NormalizedEntity {
            external_id: external_id.to_string(),
            app_key: String::new(),
            collection_key: String::new(),
            api_version: "1".to_string(),
            raw_payload: serde_json::json!({"id": external_id}),
            archived_at: None,
        }
    }

    fn app_config() -> ConnectorAppConfig {
        ConnectorAppConfig {
            api_key: SecretRef::Direct("key".into()),
            webhook_secret: SecretRef::Direct("secret".into()),
            sync_from: None,
            sync_resources: None,
        }
    }

    #[tokio::test]
    async fn drains_pages_until_cursor_exhausted() {
        let connector = ScriptedConnector::new(vec![
            Ok(ConnectorPage {
                items: vec![item("w1"), item("w2")],
                next_cursor: Some("page2".into()),
            }),
            Ok(ConnectorPage {
                items: vec![item("w3")],
                next_cursor: None,
            }),
        ]);
        let store = Arc::new(InMemoryEntityStore::new());
        let engine = PaginatedSyncEngine::new(store.clone());

        let result = engine
            .run(
                &connector,
                "app_1",
                &app_config(),
                "widget",
                None,
                None,
                SyncOptions::default(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.counters.created, 3);
        assert!(!result.has_more);
        assert_eq!(store.count("app_1", "stub_widget").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reconciles_deletions_for_ids_no_longer_seen() {
        let store = Arc::new(InMemoryEntityStore::new());
        let mut seed = item("stale");
        seed.app_key = "app_1".to_string();
        seed.collection_key = "stub_widget".to_string();
        store.upsert(seed).await.unwrap();

        let connector = ScriptedConnector::new(vec![Ok(ConnectorPage {
            items: vec![item("fresh")],
            next_cursor: None,
        })]);
        let engine = PaginatedSyncEngine::new(store.clone());

        let existing = resolve_existing_ids(store.as_ref(), "app_1", "stub_widget", None)
            .await
            .unwrap();
        let result = engine
            .run(
                &connector,
                "app_1",
                &app_config(),
                "widget",
                None,
                Some(existing),
                SyncOptions::default(),
            )
            .await;

        assert_eq!(result.counters.created, 1);
        assert_eq!(result.counters.deleted, 1);
        assert_eq!(store.count("app_1", "stub_widget").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_external_id_counts_as_error_not_fatal() {
        let connector = ScriptedConnector::new(vec![Ok(ConnectorPage {
            items: vec![item(""), item("w1")],
            next_cursor: None,
        })]);
        let store = Arc::new(InMemoryEntityStore::new());
        let engine = PaginatedSyncEngine::new(store.clone());

        let result = engine
            .run(
                &connector,
                "app_1",
                &app_config(),
                "widget",
                None,
                None,
                SyncOptions::default(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.counters.created, 1);
        assert_eq!(result.counters.errors, 1);
    }

    #[tokio::test]
    async fn list_failure_stops_early_and_skips_reconciliation() {
        let store = Arc::new(InMemoryEntityStore::new());
        let mut seed = item("stale");
        seed.app_key = "app_1".to_string();
        seed.collection_key = "stub_widget".to_string();
        store.upsert(seed).await.unwrap();

        let connector = ScriptedConnector::new(vec![Err(CoreError::UpstreamRequestFailed {
            connector: "stub".into(),
            message: "timeout".into(),
        })]);
        let engine = PaginatedSyncEngine::new(store.clone());

        let existing = resolve_existing_ids(store.as_ref(), "app_1", "stub_widget", None)
            .await
            .unwrap();
        let result = engine
            .run(
                &connector,
                "app_1",
                &app_config(),
                "widget",
                None,
                Some(existing),
                SyncOptions::default(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.counters.deleted, 0);
        assert_eq!(store.count("app_1", "stub_widget").await.unwrap(), 1);
        assert!(!result.error_messages.is_empty());
    }

    #[tokio::test]
    async fn page_limit_stops_early_without_reconciling() {
        let connector = ScriptedConnector::new(vec![
            Ok(ConnectorPage {
                items: vec![item("w1")],
                next_cursor: Some("page2".into()),
            }),
            Ok(ConnectorPage {
                items: vec![item("w2")],
                next_cursor: None,
            }),
        ]);
        let store = Arc::new(InMemoryEntityStore::new());
        let engine = PaginatedSyncEngine::new(store.clone());

        let result = engine
            .run(
                &connector,
                "app_1",
                &app_config(),
                "widget",
                None,
                Some(HashSet::new()),
                SyncOptions {
                    page_limit: Some(1),
                    since: None,
                },
            )
            .await;

        assert!(result.success);
        assert!(result.has_more);
        assert_eq!(result.next_cursor.as_deref(), Some("page2"));
        assert_eq!(result.counters.created, 1);
        assert_eq!(store.count("app_1", "stub_widget").await.unwrap(), 1);
    }
}
