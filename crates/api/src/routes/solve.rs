use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use timetable_core::validate_config;
use types::{SolverConfig, SolverInput};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolveIn {
    pub input: SolverInput,
    #[serde(default)]
    pub config: SolverConfig,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobCreated {
    pub job_id: String,
    pub status: &'static str,
}

/// Starts a run; a run still in progress is aborted first.
#[utoipa::path(
        post,
        path = "/v1/solve",
        request_body = SolveIn,
        responses(
            (status = 200, description = "Job started", body = JobCreated),
            (status = 400, description = "Config out of range")
        )
    )]
pub async fn solve(State(state): State<AppState>, Json(body): Json<SolveIn>) -> Result<Json<JobCreated>, ApiError> {
    validate_config(&body.config)?;
    let id = state.jobs.enqueue(body.input, body.config).await;
    Ok(Json(JobCreated {
        job_id: id.0,
        status: "running",
    }))
}
