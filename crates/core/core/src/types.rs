//! Core data types for the supasaasy ingestion pipeline.
//!
//! This module defines the canonical `Entity` and its supporting job/state/log
//! records, plus the in-memory shapes connectors exchange (`NormalizedEntity`,
//! `ParsedWebhookEvent`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A canonical upstream record, identified by the unique triple
/// `(app_key, collection_key, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Server-assigned opaque identifier.
    pub id: String,
    /// Which configured SaaS connection this record came from.
    pub app_key: String,
    /// Canonical resource-type tag, prefixed by connector name (e.g. `stripe_customer`).
    pub collection_key: String,
    /// Upstream provider's primary identifier for this record.
    pub external_id: String,
    /// Upstream API version tag at fetch time.
    pub api_version: String,
    /// The full upstream representation, stored verbatim.
    pub raw_payload: Value,
    /// When this record was first created locally.
    pub created_at: DateTime<Utc>,
    /// When this record was last mutated locally. Advances on every upsert.
    pub updated_at: DateTime<Utc>,
    /// Upstream soft-archive instant, if any. Distinct from local deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// Reserved for soft-delete; physical delete is preferred and used throughout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Builds a new entity row from a normalized connector item, stamping
    /// both timestamps to now (used on first insert).
    pub fn from_normalized(normalized: NormalizedEntity) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            app_key: normalized.app_key,
            collection_key: normalized.collection_key,
            external_id: normalized.external_id,
            api_version: normalized.api_version,
            raw_payload: normalized.raw_payload,
            created_at: now,
            updated_at: now,
            archived_at: normalized.archived_at,
            deleted_at: None,
        }
    }

    /// Applies an incoming normalized record onto an existing row, per the
    /// upsert-on-conflict rule: replace `raw_payload`, `api_version`,
    /// `archived_at`, bump `updated_at`. `created_at` is untouched.
    pub fn apply_upsert(&mut self, normalized: NormalizedEntity) {
        self.raw_payload = normalized.raw_payload;
        self.api_version = normalized.api_version;
        self.archived_at = normalized.archived_at;
        self.updated_at = Utc::now();
    }

    /// The triple that keys this entity in storage.
    pub fn key(&self) -> EntityKey {
        EntityKey {
            app_key: self.app_key.clone(),
            collection_key: self.collection_key.clone(),
            external_id: self.external_id.clone(),
        }
    }
}

/// Unique key for an [`Entity`] row: `(app_key, collection_key, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub app_key: String,
    pub collection_key: String,
    pub external_id: String,
}

/// Discriminator returned by an upsert so counters can be attributed correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// The connector's output shape for one upstream record. Never persisted
/// directly — an [`Entity`] is derived from it on upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub external_id: String,
    pub app_key: String,
    pub collection_key: String,
    pub api_version: String,
    pub raw_payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

/// The kind of change a webhook delivery reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    Create,
    Update,
    Delete,
    Archive,
}

/// A webhook payload after connector-specific parsing, before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedWebhookEvent {
    pub event_type: WebhookEventType,
    /// The provider's own string for this event (e.g. `"customer.created"`).
    pub original_event_type: String,
    pub resource_type: String,
    pub external_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    /// Arbitrary provider metadata (delivery id, api version, etc).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Watermark for a single `(app_key, collection_key)` sync slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub app_key: String,
    pub collection_key: String,
    pub last_synced_at: DateTime<Utc>,
    pub last_success_at: DateTime<Utc>,
}

/// Requested sync mode for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

/// Status lattice shared by [`SyncJob`] and [`SyncJobTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    PartiallySucceeded,
}

/// Aggregated per-run counters, shared by jobs and tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub errors: u64,
}

impl SyncCounters {
    pub fn total(&self) -> u64 {
        self.created + self.updated + self.errors
    }

    pub fn add(&mut self, other: SyncCounters) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.errors += other.errors;
    }
}

/// A scheduled or on-demand sync run, covering one or more resource types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub job_id: String,
    pub app_key: String,
    pub mode: SyncMode,
    pub resource_types: Vec<String>,
    pub status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counters: SyncCounters,
    #[serde(default)]
    pub error_messages: Vec<String>,
}

impl SyncJob {
    pub fn new(app_key: impl Into<String>, mode: SyncMode, resource_types: Vec<String>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            app_key: app_key.into(),
            mode,
            resource_types,
            status: SyncStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            counters: SyncCounters::default(),
            error_messages: Vec::new(),
        }
    }

    /// Derives job status from its tasks: `failed` iff every task failed,
    /// `succeeded` iff every task succeeded, otherwise `partially_succeeded`.
    pub fn derive_status(tasks: &[SyncJobTask]) -> SyncStatus {
        if tasks.is_empty() {
            return SyncStatus::Succeeded;
        }
        let all_failed = tasks.iter().all(|t| t.status == SyncStatus::Failed);
        let all_succeeded = tasks.iter().all(|t| t.status == SyncStatus::Succeeded);
        if all_failed {
            SyncStatus::Failed
        } else if all_succeeded {
            SyncStatus::Succeeded
        } else {
            SyncStatus::PartiallySucceeded
        }
    }
}

/// One resource-type unit of work within a [`SyncJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJobTask {
    pub task_id: String,
    pub job_id: String,
    pub resource_type: String,
    pub status: SyncStatus,
    pub counters: SyncCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque pagination checkpoint, persisted after every page so a worker
    /// that hits its wall-clock budget can resume without restarting the
    /// resource from scratch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_checkpoint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncJobTask {
    pub fn new(job_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            resource_type: resource_type.into(),
            status: SyncStatus::Queued,
            counters: SyncCounters::default(),
            error: None,
            cursor_checkpoint: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Append-only record of one webhook request/response. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLog {
    pub id: String,
    pub app_key: String,
    pub request_method: String,
    pub request_path: String,
    /// Sensitive values already replaced with a redaction marker.
    pub request_headers: HashMap<String, String>,
    /// Verbatim body, possibly capped — see [`WebhookLog::MAX_BODY_BYTES`].
    pub request_body: Option<Value>,
    pub response_status: u16,
    pub response_body: Option<Value>,
    pub error_message: Option<String>,
    pub processing_duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl WebhookLog {
    /// Cap on logged request bodies, protecting storage from unbounded
    /// upstream payloads.
    pub const MAX_BODY_BYTES: usize = 32 * 1024;

    /// Header names whose values are replaced before the entry is written.
    pub fn is_sensitive_header(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        lower == "authorization" || lower.contains("signature") || lower.contains("cookie")
    }

    pub const REDACTION_MARKER: &'static str = "[redacted]";
}

/// Reference to a secret, either resolved from an environment variable or
/// supplied directly in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretRef {
    Env(String),
    Direct(String),
}

impl SecretRef {
    /// Resolves the secret value. Direct secrets are returned verbatim;
    /// callers are responsible for enforcing the production-mode rejection
    /// before calling this.
    pub fn resolve(&self) -> Result<String, String> {
        match self {
            SecretRef::Env(var) => {
                std::env::var(var).map_err(|_| format!("environment variable '{var}' is not set"))
            }
            SecretRef::Direct(value) => Ok(value.clone()),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, SecretRef::Direct(_))
    }
}

/// Per-connection connector configuration, as consumed from the (external)
/// configuration loader. Intentionally thin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorAppConfig {
    pub api_key: SecretRef,
    pub webhook_secret: SecretRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_resources: Option<Vec<String>>,
}

/// One configured SaaS connection instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub app_key: String,
    pub name: String,
    pub connector: String,
    pub config: ConnectorAppConfig,
}

/// Describes one resource type a connector can sync or receive webhooks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub resource_type: String,
    pub collection_key: String,
    pub supports_incremental: bool,
    pub supports_webhooks: bool,
}

/// Static capability description for a connector, returned by `Connector::metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorMetadata {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub api_version: String,
    pub supported_resources: Vec<ResourceDescriptor>,
}
