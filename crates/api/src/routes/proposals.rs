use axum::Json;
use serde::{Deserialize, Serialize};
use solver_heur::{apply_all, propose_fixes, propose_swaps};
use timetable_core::{mark_fixed, Snapshot};
use types::{AutoFixSuggestion, KomaId, SolverInput, SwapProposal, TimetableSlot};
use utoipa::ToSchema;

use crate::error::ApiError;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwapsIn {
    pub input: SolverInput,
    pub slots: Vec<TimetableSlot>,
    #[serde(default)]
    pub focus_koma_id: Option<KomaId>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixesIn {
    pub input: SolverInput,
    pub slots: Vec<TimetableSlot>,
}

#[utoipa::path(
    post,
    path = "/v1/proposals/swaps",
    request_body = SwapsIn,
    responses(
    (status = 200, description = "Ranked move chains", body = [SwapProposal]),
    (status = 400, description = "Invalid input or slots")
    )
)]
pub async fn swaps(Json(body): Json<SwapsIn>) -> Result<Json<Vec<SwapProposal>>, ApiError> {
    let snap = Snapshot::build(&body.input)?;
    let slots = mark_fixed(&snap, &body.slots);
    Ok(Json(propose_swaps(&snap, &slots, body.focus_koma_id.as_ref())?))
}

#[utoipa::path(
    post,
    path = "/v1/proposals/fixes",
    request_body = FixesIn,
    responses(
    (status = 200, description = "Single-move repairs for error violations", body = [AutoFixSuggestion]),
    (status = 400, description = "Invalid input or slots")
    )
)]
pub async fn fixes(Json(body): Json<FixesIn>) -> Result<Json<Vec<AutoFixSuggestion>>, ApiError> {
    let snap = Snapshot::build(&body.input)?;
    let slots = mark_fixed(&snap, &body.slots);
    Ok(Json(propose_fixes(&snap, &slots)?))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyFixesIn {
    pub input: SolverInput,
    pub slots: Vec<TimetableSlot>,
    /// In ranked order, as returned by `/v1/proposals/fixes`.
    pub suggestions: Vec<AutoFixSuggestion>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyFixesOut {
    pub slots: Vec<TimetableSlot>,
    pub applied: Vec<usize>,
    pub skipped: Vec<usize>,
}

#[utoipa::path(
    post,
    path = "/v1/proposals/fixes/apply",
    request_body = ApplyFixesIn,
    responses(
    (status = 200, description = "Slots after applying every still-valid suggestion", body = ApplyFixesOut),
    (status = 400, description = "Invalid input")
    )
)]
pub async fn apply_fixes(Json(body): Json<ApplyFixesIn>) -> Result<Json<ApplyFixesOut>, ApiError> {
    let snap = Snapshot::build(&body.input)?;
    let mut slots = mark_fixed(&snap, &body.slots);
    let report = apply_all(&snap, &mut slots, &body.suggestions);
    tracing::info!(applied = report.applied.len(), skipped = report.skipped.len(), "fixes applied");
    Ok(Json(ApplyFixesOut {
        slots,
        applied: report.applied,
        skipped: report.skipped,
    }))
}
