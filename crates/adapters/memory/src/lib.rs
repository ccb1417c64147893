//! # supasaasy in-memory adapter
//!
//! In-memory storage adapters for the supasaasy ingestion pipeline, primarily
//! intended for testing and single-process deployments.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use supasaasy_adapter_memory::InMemoryEntityStore;
//!
//! let store = InMemoryEntityStore::new();
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use supasaasy_core::error::{CoreError, CoreResult};
use supasaasy_core::traits::{EntityStore, JobStore, SyncStateStore, WebhookLogStore};
use supasaasy_core::types::{
    Entity, EntityKey, NormalizedEntity, SyncJob, SyncJobTask, SyncState, WebhookLog,
};

/// In-memory [`EntityStore`] keyed by `(app_key, collection_key, external_id)`.
///
/// Data is lost when the process exits; suitable for tests and local
/// development, not for production deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    rows: Arc<RwLock<HashMap<EntityKey, Entity>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn upsert(&self, normalized: NormalizedEntity) -> CoreResult<(Entity, bool)> {
        let key = EntityKey {
            app_key: normalized.app_key.clone(),
            collection_key: normalized.collection_key.clone(),
            external_id: normalized.external_id.clone(),
        };
        let mut rows = self.rows.write().await;
        match rows.get_mut(&key) {
            Some(existing) => {
                existing.apply_upsert(normalized);
                Ok((existing.clone(), false))
            }
            None => {
                let entity = Entity::from_normalized(normalized);
                rows.insert(key, entity.clone());
                Ok((entity, true))
            }
        }
    }

    async fn get(&self, key: &EntityKey) -> CoreResult<Option<Entity>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn list_external_ids(
        &self,
        app_key: &str,
        collection_key: &str,
    ) -> CoreResult<Vec<String>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|e| e.app_key == app_key && e.collection_key == collection_key)
            .map(|e| e.external_id.clone())
            .collect())
    }

    async fn list_external_ids_created_after(
        &self,
        app_key: &str,
        collection_key: &str,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<String>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|e| {
                e.app_key == app_key && e.collection_key == collection_key && e.created_at >= since
            })
            .map(|e| e.external_id.clone())
            .collect())
    }

    async fn delete(&self, key: &EntityKey) -> CoreResult<bool> {
        Ok(self.rows.write().await.remove(key).is_some())
    }

    async fn count(&self, app_key: &str, collection_key: &str) -> CoreResult<usize> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|e| e.app_key == app_key && e.collection_key == collection_key)
            .count())
    }
}

/// In-memory [`SyncStateStore`] keyed by `(app_key, collection_key)`.
#[derive(Debug, Clone, Default)]
pub struct InMemorySyncStateStore {
    states: Arc<RwLock<HashMap<(String, String), SyncState>>>,
}

impl InMemorySyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStateStore for InMemorySyncStateStore {
    async fn get(&self, app_key: &str, collection_key: &str) -> CoreResult<Option<SyncState>> {
        let states = self.states.read().await;
        Ok(states
            .get(&(app_key.to_string(), collection_key.to_string()))
            .cloned())
    }

    async fn upsert(&self, state: SyncState) -> CoreResult<()> {
        let mut states = self.states.write().await;
        states.insert((state.app_key.clone(), state.collection_key.clone()), state);
        Ok(())
    }
}

/// In-memory [`JobStore`] holding jobs and tasks in separate maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, SyncJob>>>,
    tasks: Arc<RwLock<HashMap<String, SyncJobTask>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, job: &SyncJob) -> CoreResult<()> {
        self.jobs.write().await.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> CoreResult<Option<SyncJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update_job(&self, job: &SyncJob) -> CoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.job_id) {
            return Err(CoreError::not_found("sync_job", "job_id", &job.job_id));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn create_task(&self, task: &SyncJobTask) -> CoreResult<()> {
        self.tasks
            .write()
            .await
            .insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> CoreResult<Option<SyncJobTask>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn list_tasks(&self, job_id: &str) -> CoreResult<Vec<SyncJobTask>> {
        let tasks = self.tasks.read().await;
        let mut matched: Vec<SyncJobTask> = tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.created_at);
        Ok(matched)
    }

    async fn update_task(&self, task: &SyncJobTask) -> CoreResult<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&task.task_id) {
            return Err(CoreError::not_found("sync_job_task", "task_id", &task.task_id));
        }
        tasks.insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn list_pending_jobs(&self) -> CoreResult<Vec<SyncJob>> {
        use supasaasy_core::types::SyncStatus;
        let jobs = self.jobs.read().await;
        let mut pending: Vec<SyncJob> = jobs
            .values()
            .filter(|j| matches!(j.status, SyncStatus::Queued | SyncStatus::Running))
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        Ok(pending)
    }
}

/// In-memory [`WebhookLogStore`] that retains the most recent entries per app.
#[derive(Debug, Clone)]
pub struct InMemoryWebhookLogStore {
    logs: Arc<RwLock<HashMap<String, Vec<WebhookLog>>>>,
    max_per_app: usize,
}

impl InMemoryWebhookLogStore {
    pub fn new(max_per_app: usize) -> Self {
        Self {
            logs: Arc::new(RwLock::new(HashMap::new())),
            max_per_app,
        }
    }
}

impl Default for InMemoryWebhookLogStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryWebhookLogStore {
    async fn append(&self, log: WebhookLog) -> CoreResult<()> {
        let mut logs = self.logs.write().await;
        let entry = logs.entry(log.app_key.clone()).or_default();
        entry.push(log);
        if entry.len() > self.max_per_app {
            let excess = entry.len() - self.max_per_app;
            entry.drain(0..excess);
        }
        Ok(())
    }

    async fn list_recent(&self, app_key: &str, limit: usize) -> CoreResult<Vec<WebhookLog>> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(app_key)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// A [`WebhookLogStore`] that discards every entry, for deployments that
/// don't want request logs retained at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWebhookLogStore;

#[async_trait]
impl WebhookLogStore for NullWebhookLogStore {
    async fn append(&self, _log: WebhookLog) -> CoreResult<()> {
        Ok(())
    }

    async fn list_recent(&self, _app_key: &str, _limit: usize) -> CoreResult<Vec<WebhookLog>> {
        Ok(Vec::new())
    }
}
