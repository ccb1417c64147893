//! Cron scheduler: wakes on an interval, fires a due `sync_schedule` as an
//! incremental [`SyncJob`], and realizes "periodic reconciliation" without an
//! external cron daemon. Spawned alongside the worker loop from `main`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;

use supasaasy_connectors::ConnectorRegistry;
use supasaasy_core::types::SyncMode;
use supasaasy_jobs::JobManager;

use crate::config::SyncScheduleConfig;
use crate::sync_runner::resolve_resource_types;

/// Parses a standard five-field cron expression. The `cron` crate itself
/// expects a leading seconds field, so a `"0 "` prefix is added before
/// parsing — every fire still lands on a whole minute.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(&format!("0 {expr}"))
}

pub struct Scheduler {
    schedules: Vec<SyncScheduleConfig>,
    registry: Arc<ConnectorRegistry>,
    job_manager: Arc<JobManager>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        schedules: Vec<SyncScheduleConfig>,
        registry: Arc<ConnectorRegistry>,
        job_manager: Arc<JobManager>,
        poll_interval: Duration,
    ) -> Self {
        Self { schedules, registry, job_manager, poll_interval }
    }

    /// Runs forever. Intended to be spawned with `tokio::spawn`.
    pub async fn run(self) {
        let start = Utc::now();
        let mut last_fired: HashMap<String, DateTime<Utc>> = HashMap::new();
        loop {
            self.tick(&mut last_fired, start).await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn tick(&self, last_fired: &mut HashMap<String, DateTime<Utc>>, start: DateTime<Utc>) {
        let now = Utc::now();
        for schedule in self.schedules.iter().filter(|s| s.enabled) {
            let parsed = match parse_cron(&schedule.cron) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(app_key = %schedule.app_key, cron = %schedule.cron, error = %err, "invalid cron expression, skipping");
                    continue;
                }
            };

            let since = *last_fired.get(&schedule.app_key).unwrap_or(&start);
            let Some(next) = parsed.after(&since).next() else { continue };
            if next > now {
                continue;
            }
            last_fired.insert(schedule.app_key.clone(), now);
            self.fire(&schedule.app_key).await;
        }
    }

    async fn fire(&self, app_key: &str) {
        let (app_config, connector) = match self.registry.resolve(app_key).await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(app_key, error = %err, "scheduled sync: app resolution failed");
                return;
            }
        };
        let resource_types =
            resolve_resource_types(connector.as_ref(), &app_config.config, None, SyncMode::Incremental);
        if resource_types.is_empty() {
            tracing::warn!(app_key, "scheduled sync: no incremental-capable resource types, skipping");
            return;
        }
        match self.job_manager.create_job(app_key.to_string(), SyncMode::Incremental, resource_types).await {
            Ok((job, _tasks)) => tracing::info!(app_key, job_id = %job.job_id, "enqueued scheduled incremental sync"),
            Err(err) => tracing::error!(app_key, error = %err, "failed to enqueue scheduled sync"),
        }
    }
}
