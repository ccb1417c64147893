//! Core traits for the supasaasy ingestion pipeline.
//!
//! This module defines the trait interfaces that storage adapters and
//! connectors must implement to integrate with the sync engine and
//! webhook admission pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{
    ConnectorAppConfig, ConnectorMetadata, Entity, EntityKey, NormalizedEntity,
    ParsedWebhookEvent, SyncJob, SyncJobTask, SyncState, WebhookLog,
};

/// Trait for storage adapters that persist [`Entity`] rows.
///
/// Adapters implement this trait to provide persistence for the canonical
/// entity table keyed by `(app_key, collection_key, external_id)`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Inserts a new entity row, or replaces the existing row sharing the
    /// same key, returning which case occurred.
    async fn upsert(&self, normalized: NormalizedEntity) -> CoreResult<(Entity, bool)>;

    /// Looks up a single entity by its unique key.
    async fn get(&self, key: &EntityKey) -> CoreResult<Option<Entity>>;

    /// Lists every external_id currently stored for an `(app_key, collection_key)`
    /// pair. Used by the sync engine's deletion-reconciliation pass.
    async fn list_external_ids(
        &self,
        app_key: &str,
        collection_key: &str,
    ) -> CoreResult<Vec<String>>;

    /// Lists external_ids whose local row was created after `since`. Used to
    /// implement `sync_from` windowing on a collection that has never synced.
    async fn list_external_ids_created_after(
        &self,
        app_key: &str,
        collection_key: &str,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<String>>;

    /// Deletes a single entity by key. Returns `true` if a row was removed.
    async fn delete(&self, key: &EntityKey) -> CoreResult<bool>;

    /// Counts entities for an `(app_key, collection_key)` pair.
    async fn count(&self, app_key: &str, collection_key: &str) -> CoreResult<usize> {
        let _ = (app_key, collection_key);
        Ok(0)
    }
}

/// Trait for storage adapters that persist [`SyncState`] watermarks.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Reads the watermark for an `(app_key, collection_key)` pair, if any.
    async fn get(&self, app_key: &str, collection_key: &str) -> CoreResult<Option<SyncState>>;

    /// Writes or replaces the watermark for an `(app_key, collection_key)` pair.
    async fn upsert(&self, state: SyncState) -> CoreResult<()>;
}

/// Trait for storage adapters that persist [`SyncJob`] and [`SyncJobTask`] rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a newly created job.
    async fn create_job(&self, job: &SyncJob) -> CoreResult<()>;

    /// Fetches a job by id.
    async fn get_job(&self, job_id: &str) -> CoreResult<Option<SyncJob>>;

    /// Overwrites a job's persisted state.
    async fn update_job(&self, job: &SyncJob) -> CoreResult<()>;

    /// Persists a newly created task.
    async fn create_task(&self, task: &SyncJobTask) -> CoreResult<()>;

    /// Fetches a task by id.
    async fn get_task(&self, task_id: &str) -> CoreResult<Option<SyncJobTask>>;

    /// Lists every task belonging to a job, in creation order.
    async fn list_tasks(&self, job_id: &str) -> CoreResult<Vec<SyncJobTask>>;

    /// Overwrites a task's persisted state.
    async fn update_task(&self, task: &SyncJobTask) -> CoreResult<()>;

    /// Lists jobs that are queued or running, oldest first. Used by the
    /// worker loop to find the next unit of work.
    async fn list_pending_jobs(&self) -> CoreResult<Vec<SyncJob>>;
}

/// Trait for storage adapters that persist [`WebhookLog`] rows.
///
/// An adapter may choose to be a no-op sink (see `NullWebhookLogStore` in
/// the memory adapter crate) for deployments that don't want request logs
/// retained at all.
#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    /// Appends a webhook log entry. Entries are never mutated after creation.
    async fn append(&self, log: WebhookLog) -> CoreResult<()>;

    /// Lists the most recent log entries for an app_key, newest first.
    async fn list_recent(&self, app_key: &str, limit: usize) -> CoreResult<Vec<WebhookLog>> {
        let _ = (app_key, limit);
        Ok(Vec::new())
    }
}

/// One page of results returned by a connector's listing call.
pub struct ConnectorPage {
    pub items: Vec<NormalizedEntity>,
    /// Opaque cursor to pass back in for the next page, `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// Trait implemented by each supported SaaS integration.
///
/// A connector owns the details of talking to exactly one upstream API:
/// paginated listing, incremental filtering, and webhook signature
/// verification plus payload parsing. The sync engine and webhook admission
/// pipeline are written entirely against this trait and hold no
/// provider-specific knowledge.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short, stable identifier for this connector (e.g. `"stripe"`).
    fn name(&self) -> &'static str;

    /// Static capability description: display name, versions, supported resources.
    fn metadata(&self) -> ConnectorMetadata;

    /// Resource types this connector knows how to sync (e.g. `["customer", "invoice"]`).
    fn resource_types(&self) -> &[&'static str];

    /// Builds the canonical collection_key for a resource type, e.g.
    /// `stripe_customer`.
    fn collection_key(&self, resource_type: &str) -> String {
        format!("{}_{}", self.name(), resource_type)
    }

    /// Validates an app's connector configuration before any other operation
    /// runs against it: missing secrets, unknown resource types, malformed
    /// `sync_from`. `production` gates whether a directly-supplied secret is
    /// merely warned about or rejected outright. Returns field-naming error
    /// messages, empty when valid.
    fn validate_config(&self, config: &ConnectorAppConfig, production: bool) -> Vec<String>;

    /// Fetches one page of results for a resource type, starting from
    /// `cursor` (`None` for the first page). `since` restricts results to
    /// records changed at or after that instant, for incremental syncs.
    /// `app_config` carries the per-connection API key and sync options.
    async fn list_page(
        &self,
        app_key: &str,
        app_config: &ConnectorAppConfig,
        resource_type: &str,
        cursor: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> CoreResult<ConnectorPage>;

    /// Verifies the signature of an inbound webhook request against the
    /// connection's configured secret. Must run in constant time.
    fn verify_signature(
        &self,
        headers: &std::collections::HashMap<String, String>,
        raw_body: &[u8],
        secret: &str,
    ) -> CoreResult<()>;

    /// Parses a verified webhook body into zero or more normalized events.
    fn parse_webhook(&self, raw_body: &[u8]) -> CoreResult<Vec<ParsedWebhookEvent>>;
}
