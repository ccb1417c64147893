//! `GET /jobs/{job_id}` and `GET /jobs/{job_id}/tasks`: read-only status
//! lookups for jobs created either by `/sync` (durable mode) or the cron
//! scheduler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use supasaasy_jobs::JobManager;

use crate::error::{ServerError, ServerResult};

pub struct JobsHandlerState {
    pub job_manager: Arc<JobManager>,
}

#[tracing::instrument(skip(state))]
pub async fn get_job(State(state): State<Arc<JobsHandlerState>>, Path(job_id): Path<String>) -> Response {
    match fetch_job(&state, &job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(err) => error_response(&err),
    }
}

#[tracing::instrument(skip(state))]
pub async fn get_job_tasks(
    State(state): State<Arc<JobsHandlerState>>,
    Path(job_id): Path<String>,
) -> Response {
    match fetch_tasks(&state, &job_id).await {
        Ok(tasks) => (StatusCode::OK, Json(tasks)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn fetch_job(
    state: &JobsHandlerState,
    job_id: &str,
) -> ServerResult<supasaasy_core::types::SyncJob> {
    state
        .job_manager
        .get_job(job_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("job '{job_id}'")))
}

async fn fetch_tasks(
    state: &JobsHandlerState,
    job_id: &str,
) -> ServerResult<Vec<supasaasy_core::types::SyncJobTask>> {
    fetch_job(state, job_id).await?;
    Ok(state.job_manager.list_tasks(job_id).await?)
}

fn error_response(err: &ServerError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": err.public_message() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use supasaasy_adapter_memory::InMemoryJobStore;
    use supasaasy_core::types::{SyncMode, SyncStatus};

    fn state() -> Arc<JobsHandlerState> {
        Arc::new(JobsHandlerState {
            job_manager: Arc::new(JobManager::new(Arc::new(InMemoryJobStore::new()))),
        })
    }

    #[tokio::test]
    async fn unknown_job_id_is_404() {
        let state = state();
        let err = fetch_job(&state, "ghost").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn known_job_returns_its_record_and_tasks() {
        let state = state();
        let (job, tasks) = state
            .job_manager
            .create_job("app_1", SyncMode::Full, vec!["customer".into()])
            .await
            .unwrap();

        let fetched = fetch_job(&state, &job.job_id).await.unwrap();
        assert_eq!(fetched.job_id, job.job_id);
        assert_eq!(fetched.status, SyncStatus::Queued);

        let fetched_tasks = fetch_tasks(&state, &job.job_id).await.unwrap();
        assert_eq!(fetched_tasks.len(), tasks.len());
    }

    #[tokio::test]
    async fn tasks_for_unknown_job_is_404() {
        let state = state();
        let err = fetch_tasks(&state, "ghost").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
