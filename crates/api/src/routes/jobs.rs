use axum::{
    extract::{Path, State},
    Json,
};
use jobs::JobStatus;
use types::SolverResult;

use crate::error::ApiError;
use crate::state::AppState;

fn lookup(state: &AppState, id: &str) -> Result<JobStatus, ApiError> {
    state
        .jobs
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))
}

#[utoipa::path(
        get,
        path = "/v1/jobs/{id}",
        params(("id" = String, Path, description = "Job ID")),
        responses(
            (status = 200, description = "Job status with latest progress", body = JobStatus),
            (status = 404, description = "Unknown job")
        )
    )]
pub async fn status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobStatus>, ApiError> {
    lookup(&state, &id).map(Json)
}

#[utoipa::path(
        get,
        path = "/v1/jobs/{id}/result",
        params(("id" = String, Path, description = "Job ID")),
        responses(
            (status = 200, description = "Ranked patterns", body = [SolverResult]),
            (status = 404, description = "Unknown job or no result")
        )
    )]
pub async fn result(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<SolverResult>>, ApiError> {
    match lookup(&state, &id)? {
        JobStatus::Solved { patterns } => Ok(Json(patterns)),
        other => Err(ApiError::NotFound(format!(
            "job {id} has no result ({})",
            serde_json::to_value(&other)
                .ok()
                .and_then(|v| v["status"].as_str().map(str::to_string))
                .unwrap_or_default()
        ))),
    }
}

#[utoipa::path(
        post,
        path = "/v1/jobs/{id}/abort",
        params(("id" = String, Path, description = "Job ID")),
        responses(
            (status = 200, description = "Status after the abort request", body = JobStatus),
            (status = 404, description = "Unknown job")
        )
    )]
pub async fn abort(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobStatus>, ApiError> {
    state
        .jobs
        .abort(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))
}
