//! Worker loop: drains queued [`SyncJob`]s in FIFO order, running each
//! task's resource-type sync against its connector. Spawned with
//! `tokio::spawn` from `main`, alongside the [`crate::scheduler::Scheduler`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use supasaasy_core::error::CoreResult;
use supasaasy_core::traits::{EntityStore, SyncStateStore};
use supasaasy_core::types::{SyncCounters, SyncStatus};
use supasaasy_connectors::ConnectorRegistry;
use supasaasy_jobs::JobManager;
use supasaasy_sync_engine::PaginatedSyncEngine;

use crate::sync_runner::run_resource_sync;

pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// Soft per-invocation wall clock. Once exceeded, the worker stops
    /// starting new tasks and returns; incomplete tasks are picked up on the
    /// next invocation, resuming from the task's own watermark/cursor state.
    pub wall_clock_budget: Duration,
}

pub struct Worker {
    job_manager: Arc<JobManager>,
    registry: Arc<ConnectorRegistry>,
    entity_store: Arc<dyn EntityStore>,
    sync_state_store: Arc<dyn SyncStateStore>,
    engine: Arc<PaginatedSyncEngine>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        job_manager: Arc<JobManager>,
        registry: Arc<ConnectorRegistry>,
        entity_store: Arc<dyn EntityStore>,
        sync_state_store: Arc<dyn SyncStateStore>,
        engine: Arc<PaginatedSyncEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self { job_manager, registry, entity_store, sync_state_store, engine, config }
    }

    /// Runs forever. Intended to be spawned with `tokio::spawn`.
    pub async fn run(self) {
        loop {
            if let Err(err) = self.drain_once().await {
                tracing::error!(error = %err, "worker drain pass failed");
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn drain_once(&self) -> CoreResult<()> {
        let deadline = Instant::now() + self.config.wall_clock_budget;
        let jobs = self.job_manager.list_pending_jobs().await?;

        for job in jobs {
            if Instant::now() >= deadline {
                break;
            }

            if job.status == SyncStatus::Queued {
                self.job_manager.mark_job_running(&job.job_id).await?;
            }

            let tasks = self.job_manager.list_tasks(&job.job_id).await?;
            for task in tasks {
                if Instant::now() >= deadline {
                    break;
                }
                if matches!(task.status, SyncStatus::Succeeded | SyncStatus::Failed) {
                    continue;
                }

                self.job_manager.mark_task_running(&task.task_id).await?;

                let outcome = self.registry.resolve(&job.app_key).await;
                let (app_config, connector) = match outcome {
                    Ok(pair) => pair,
                    Err(err) => {
                        self.job_manager
                            .complete_task(&task.task_id, SyncStatus::Failed, SyncCounters::default(), Some(err.to_string()))
                            .await?;
                        continue;
                    }
                };

                let result = run_resource_sync(
                    &self.engine,
                    self.entity_store.as_ref(),
                    self.sync_state_store.as_ref(),
                    connector.as_ref(),
                    &job.app_key,
                    &app_config.config,
                    &task.resource_type,
                    job.mode,
                )
                .await;

                let status = if result.success { SyncStatus::Succeeded } else { SyncStatus::Failed };
                let error = result.error_messages.first().cloned();
                self.job_manager.complete_task(&task.task_id, status, result.counters, error).await?;
            }

            let remaining = self.job_manager.list_tasks(&job.job_id).await?;
            let all_terminal =
                remaining.iter().all(|t| matches!(t.status, SyncStatus::Succeeded | SyncStatus::Failed));
            if all_terminal {
                self.job_manager.complete_job(&job.job_id).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use supasaasy_adapter_memory::{InMemoryEntityStore, InMemoryJobStore, InMemorySyncStateStore};
    use supasaasy_core::error::CoreResult as Res;
    use supasaasy_core::traits::{Connector, ConnectorPage};
    use supasaasy_core::types::{
        AppConfig, ConnectorAppConfig, ConnectorMetadata, NormalizedEntity, ParsedWebhookEvent,
        SecretRef, SyncMode,
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
                supported_resources: Vec::new(),
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
        ) -> Res<ConnectorPage> {
            Ok(ConnectorPage {
                items: vec![NormalizedEntity {
                    external_id: "w1".into(),
                    app_key: String::new(),
                    collection_key: String::new(),
                    api_version: "1".into(),
                    raw_payload: serde_json::json!({"id": "w1"}),
                    archived_at: None,
                }],
                next_cursor: None,
            })
        }

        fn verify_signature(
            &self,
            _headers: &HashMap<String, String>,
            _raw_body: &[u8],
            _secret: &str,
        ) -> Res<()> {
            Ok(())
        }

        fn parse_webhook(&self, _raw_body: &[u8]) -> Res<Vec<ParsedWebhookEvent>> {
            Ok(Vec::new())
        }
    }

    async fn worker_with_one_app() -> (Worker, Arc<JobManager>) {
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(StubConnector));
        registry
            .load_apps(vec![AppConfig {
                app_key: "app_1".into(),
                name: "App One".into(),
                connector: "stub".into(),
                config: ConnectorAppConfig {
                    api_key: SecretRef::Direct("k".into()),
                    webhook_secret: SecretRef::Direct("s".into()),
                    sync_from: None,
                    sync_resources: None,
                },
            }])
            .await;

        let job_manager = Arc::new(JobManager::new(Arc::new(InMemoryJobStore::new())));
        let entity_store: Arc<dyn EntityStore> = Arc::new(InMemoryEntityStore::new());
        let sync_state_store: Arc<dyn SyncStateStore> = Arc::new(InMemorySyncStateStore::new());
        let engine = Arc::new(PaginatedSyncEngine::new(entity_store.clone()));

        let worker = Worker::new(
            job_manager.clone(),
            Arc::new(registry),
            entity_store,
            sync_state_store,
            engine,
            WorkerConfig { poll_interval: Duration::from_millis(10), wall_clock_budget: Duration::from_secs(5) },
        );
        (worker, job_manager)
    }

    #[tokio::test]
    async fn drains_a_queued_job_to_completion() {
        let (worker, job_manager) = worker_with_one_app().await;
        let (job, _tasks) =
            job_manager.create_job("app_1", SyncMode::Full, vec!["widget".into()]).await.unwrap();

        worker.drain_once().await.unwrap();

        let finished = job_manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(finished.status, SyncStatus::Succeeded);
        assert_eq!(finished.counters.created, 1);
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn task_for_unknown_app_fails_without_aborting_the_drain() {
        let (worker, job_manager) = worker_with_one_app().await;
        let (job, _tasks) = job_manager
            .create_job("ghost_app", SyncMode::Full, vec!["widget".into()])
            .await
            .unwrap();

        worker.drain_once().await.unwrap();

        let finished = job_manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(finished.status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn rerunning_a_completed_job_is_a_no_op() {
        let (worker, job_manager) = worker_with_one_app().await;
        let (job, _tasks) =
            job_manager.create_job("app_1", SyncMode::Full, vec!["widget".into()]).await.unwrap();
        worker.drain_once().await.unwrap();
        worker.drain_once().await.unwrap();

        let finished = job_manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(finished.status, SyncStatus::Succeeded);
        assert_eq!(finished.counters.created, 1);
    }
}
