use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::get_config;
use crate::error::AppError;
use crate::routes::AppState;
use crate::services::jobs::{JobError, JobRecord, JobState};

#[derive(Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub job_id: String,
    pub state: JobState,
    pub percent: u8,
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobResponse {
    fn new(job_id: Uuid, record: JobRecord) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: record.state,
            percent: record.percent,
            step: record.step,
            result: record.result,
            error: record.error,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct JobPollQuery {
    /// When true, the request long-polls until the job changes or the
    /// server-side deadline passes.
    pub wait: Option<bool>,
}

fn parse_job_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidInput(format!("'{}' is not a job id", raw)))
}

#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job id"),
        JobPollQuery
    ),
    responses(
        (status = 200, description = "Job progress", body = JobResponse),
        (status = 404, description = "Unknown or expired job")
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<JobPollQuery>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id = parse_job_id(&job_id)?;

    let record = if query.wait.unwrap_or(false) {
        let deadline = Duration::from_secs(get_config().job_poll_deadline_secs);
        state.jobs.wait_for_change(job_id, deadline).await
    } else {
        state.jobs.get(job_id).await
    };

    let record =
        record.ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
    Ok(Json(JobResponse::new(job_id, record)))
}

#[utoipa::path(
    delete,
    path = "/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Cancellation requested or record removed", body = JobResponse),
        (status = 404, description = "Unknown or expired job")
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id = parse_job_id(&job_id)?;

    let record = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

    if record.state.is_terminal() {
        // Nothing to cancel; drop the record so pollers stop finding it.
        state.jobs.remove(job_id).await;
        return Ok(Json(JobResponse::new(job_id, record)));
    }

    state.jobs.request_cancel(job_id).await;
    let record = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

    println!("Jobs | DELETE /jobs/{} | res=200", job_id);
    Ok(Json(JobResponse::new(job_id, record)))
}
