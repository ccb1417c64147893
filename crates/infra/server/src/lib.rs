//! Application wiring for the supasaasy server binary: shared state, router
//! assembly, and the background loops (`Worker`, `Scheduler`) spawned
//! alongside the HTTP listener.

pub mod config;
pub mod error;
pub mod jobs_handler;
pub mod scheduler;
pub mod sync_handler;
pub mod sync_runner;
pub mod worker;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use supasaasy_connectors::ConnectorRegistry;
use supasaasy_core::traits::{EntityStore, JobStore, SyncStateStore, WebhookLogStore};
use supasaasy_jobs::JobManager;
use supasaasy_rate_limiter::RateLimiter;
use supasaasy_sync_engine::PaginatedSyncEngine;
use supasaasy_webhooks::WebhookState;

use config::ResolvedConfig;
use jobs_handler::{get_job, get_job_tasks, JobsHandlerState};
use scheduler::Scheduler;
use sync_handler::{handle_sync, SyncHandlerState};
use worker::{Worker, WorkerConfig};

/// Everything the running process needs, built once in `main` and handed out
/// to whichever subsystem (router, worker, scheduler) needs a slice of it.
pub struct AppContext {
    pub registry: Arc<ConnectorRegistry>,
    pub entity_store: Arc<dyn EntityStore>,
    pub sync_state_store: Arc<dyn SyncStateStore>,
    pub job_store: Arc<dyn JobStore>,
    pub webhook_log_store: Arc<dyn WebhookLogStore>,
    pub engine: Arc<PaginatedSyncEngine>,
    pub config: ResolvedConfig,
}

/// Builds the full axum router: webhook ingestion under `/webhook`, the
/// admin sync trigger at `/sync`, and read-only job status under `/jobs`.
pub fn build_router(ctx: &AppContext) -> Router {
    let job_manager = Arc::new(JobManager::new(ctx.job_store.clone()));

    let webhook_state = Arc::new(WebhookState {
        registry: ctx.registry.clone(),
        entity_store: ctx.entity_store.clone(),
        log_store: ctx.webhook_log_store.clone(),
        rate_limiter: Arc::new(RateLimiter::new()),
        rate_limit_per_minute: ctx.config.server.webhook_rate_limit_per_minute,
        production: ctx.config.server.production,
    });

    let sync_state = Arc::new(SyncHandlerState {
        registry: ctx.registry.clone(),
        entity_store: ctx.entity_store.clone(),
        sync_state_store: ctx.sync_state_store.clone(),
        job_manager: job_manager.clone(),
        engine: ctx.engine.clone(),
        rate_limiter: Arc::new(RateLimiter::new()),
        admin_api_key: admin_api_key(),
        admin_rate_limit_per_minute: ctx.config.server.admin_rate_limit_per_minute,
        durable: ctx.config.server.durable_jobs,
        production: ctx.config.server.production,
    });

    let jobs_state = Arc::new(JobsHandlerState { job_manager });

    // A separate sub-router with its own `RequestBodyLimitLayer`: layers only
    // cover routes already registered on the `Router` they're applied to, so
    // chaining `/sync` onto the webhook router's return value would leave it
    // uncovered by that router's own layer.
    let admin_router = Router::new()
        .route("/sync", axum::routing::post(handle_sync).with_state(sync_state))
        .route("/jobs/{job_id}", get(get_job).with_state(jobs_state.clone()))
        .route("/jobs/{job_id}/tasks", get(get_job_tasks).with_state(jobs_state))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            supasaasy_webhooks::admission::MAX_BODY_BYTES as usize,
        ));

    supasaasy_webhooks::router(webhook_state).merge(admin_router)
}

/// Admin credential for the `/sync` endpoint. Read from the environment
/// rather than the config file — unlike per-connector secrets, there is no
/// `_env`/direct choice to make here, it's always an environment variable.
pub fn admin_api_key() -> String {
    std::env::var("ADMIN_API_KEY").unwrap_or_default()
}

/// Constructs the worker loop over the shared stores and connector registry.
pub fn build_worker(ctx: &AppContext) -> Worker {
    Worker::new(
        Arc::new(JobManager::new(ctx.job_store.clone())),
        ctx.registry.clone(),
        ctx.entity_store.clone(),
        ctx.sync_state_store.clone(),
        ctx.engine.clone(),
        WorkerConfig {
            poll_interval: std::time::Duration::from_millis(ctx.config.server.worker_poll_interval_ms),
            wall_clock_budget: std::time::Duration::from_millis(ctx.config.server.worker_wall_clock_ms),
        },
    )
}

/// Constructs the cron scheduler over the configured `sync_schedules`.
pub fn build_scheduler(ctx: &AppContext) -> Scheduler {
    Scheduler::new(
        ctx.config.sync_schedules.clone(),
        ctx.registry.clone(),
        Arc::new(JobManager::new(ctx.job_store.clone())),
        std::time::Duration::from_millis(ctx.config.server.scheduler_poll_interval_ms),
    )
}
