//! Clustering submission and job status.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use synopsis_core::{Error, JobStatus};

use super::{decode_json, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ClusterRequest {
    pub batch_id: String,
    pub k: i64,
    /// Caller-chosen job id; a UUIDv7 is generated when absent.
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /clusters`: records the job and answers 202 before it runs.
pub async fn submit_clustering(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ClusterResponse>), ApiError> {
    let request: ClusterRequest = decode_json(&headers, &body)?;
    let job_id = request
        .job_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    state
        .service
        .submit_clustering(&request.batch_id, request.k, &job_id)
        .await?;
    info!(
        subsystem = "api",
        job_id = %job_id,
        batch_id = %request.batch_id,
        k = request.k,
        "Clustering job accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(ClusterResponse { job_id })))
}

/// `GET /jobs/:id`
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state
        .service
        .job(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("job {id} not found")))?;
    Ok(Json(JobResponse {
        id: job.id,
        status: job.status,
        error: job.error_message,
    }))
}
