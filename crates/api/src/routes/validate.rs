use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use timetable_core::{validate_config, Snapshot, ValidationError};
use types::{SolverConfig, SolverInput};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateIn {
    pub input: SolverInput,
    #[serde(default)]
    pub config: Option<SolverConfig>,
}

#[derive(Serialize, ToSchema)]
pub struct ValidationReport {
    pub ok: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/v1/validate",
    request_body = ValidateIn,
    responses(
    (status = 200, description = "Validation result", body = ValidationReport)
    )
)]
pub async fn validate_handler(Json(body): Json<ValidateIn>) -> (StatusCode, Json<ValidationReport>) {
    let mut errors: Vec<String> = Vec::new();
    if let Err(ValidationError::Msg(msg)) = Snapshot::build(&body.input) {
        errors.extend(msg.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
    }
    if let Some(cfg) = &body.config {
        if let Err(e) = validate_config(cfg) {
            errors.push(e.to_string());
        }
    }
    (
        StatusCode::OK,
        Json(ValidationReport {
            ok: errors.is_empty(),
            errors,
        }),
    )
}
