//! # supasaasy jobs
//!
//! Lifecycle operations for [`SyncJob`]/[`SyncJobTask`] rows, layered over a
//! [`JobStore`]. Callers (the sync handler, the worker loop) drive state
//! transitions through this API rather than poking store rows directly, so
//! the status-derivation rule stays centralized.

use std::sync::Arc;

use chrono::Utc;

use supasaasy_core::error::{CoreError, CoreResult};
use supasaasy_core::traits::JobStore;
use supasaasy_core::types::{SyncCounters, SyncJob, SyncJobTask, SyncMode, SyncStatus};

/// Thin wrapper around a [`JobStore`] exposing job/task state transitions.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn JobStore>,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Creates a job and one queued task per resource type.
    pub async fn create_job(
        &self,
        app_key: impl Into<String>,
        mode: SyncMode,
        resource_types: Vec<String>,
    ) -> CoreResult<(SyncJob, Vec<SyncJobTask>)> {
        let job = SyncJob::new(app_key, mode, resource_types.clone());
        self.store.create_job(&job).await?;

        let mut tasks = Vec::with_capacity(resource_types.len());
        for resource_type in resource_types {
            let task = SyncJobTask::new(job.job_id.clone(), resource_type);
            self.store.create_task(&task).await?;
            tasks.push(task);
        }
        Ok((job, tasks))
    }

    /// Transitions a queued job to running, stamping `started_at`.
    pub async fn mark_job_running(&self, job_id: &str) -> CoreResult<SyncJob> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("sync_job", "job_id", job_id))?;
        job.status = SyncStatus::Running;
        job.started_at.get_or_insert(Utc::now());
        self.store.update_job(&job).await?;
        Ok(job)
    }

    /// Transitions a queued task to running, stamping `started_at`.
    pub async fn mark_task_running(&self, task_id: &str) -> CoreResult<SyncJobTask> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("sync_job_task", "task_id", task_id))?;
        task.status = SyncStatus::Running;
        task.started_at.get_or_insert(Utc::now());
        self.store.update_task(&task).await?;
        Ok(task)
    }

    /// Records a page's cursor checkpoint onto a running task without
    /// changing its status, so a worker that hits its wall-clock budget can
    /// resume from this point.
    pub async fn checkpoint_task(&self, task_id: &str, cursor: Option<String>) -> CoreResult<()> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("sync_job_task", "task_id", task_id))?;
        task.cursor_checkpoint = cursor;
        self.store.update_task(&task).await
    }

    /// Completes a task with a final status, counters, and optional error
    /// message, stamping `finished_at`.
    pub async fn complete_task(
        &self,
        task_id: &str,
        status: SyncStatus,
        counters: SyncCounters,
        error: Option<String>,
    ) -> CoreResult<SyncJobTask> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("sync_job_task", "task_id", task_id))?;
        task.status = status;
        task.counters = counters;
        task.error = error;
        task.finished_at = Some(Utc::now());
        task.cursor_checkpoint = None;
        self.store.update_task(&task).await?;
        Ok(task)
    }

    /// Finalizes a job from the terminal state of its tasks: aggregates
    /// counters and error messages, derives overall status via
    /// [`SyncJob::derive_status`], and stamps `finished_at`.
    pub async fn complete_job(&self, job_id: &str) -> CoreResult<SyncJob> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("sync_job", "job_id", job_id))?;
        let tasks = self.store.list_tasks(job_id).await?;

        let mut counters = SyncCounters::default();
        let mut error_messages = Vec::new();
        for task in &tasks {
            counters.add(task.counters);
            if let Some(ref error) = task.error {
                error_messages.push(format!("{}: {error}", task.resource_type));
            }
        }

        job.status = SyncJob::derive_status(&tasks);
        job.counters = counters;
        job.error_messages = error_messages;
        job.finished_at = Some(Utc::now());
        self.store.update_job(&job).await?;
        Ok(job)
    }

    /// Lists jobs that are queued or running, oldest first — the worker
    /// loop's source of work.
    pub async fn list_pending_jobs(&self) -> CoreResult<Vec<SyncJob>> {
        self.store.list_pending_jobs().await
    }

    /// Lists every task belonging to a job, in creation order.
    pub async fn list_tasks(&self, job_id: &str) -> CoreResult<Vec<SyncJobTask>> {
        self.store.list_tasks(job_id).await
    }

    pub async fn get_job(&self, job_id: &str) -> CoreResult<Option<SyncJob>> {
        self.store.get_job(job_id).await
    }
}
