use std::collections::BTreeMap;

use axum::Json;
use serde::{Deserialize, Serialize};
use timetable_core::{evaluate, mark_fixed, Placement, Snapshot};
use types::{Severity, Shortfall, SolverInput, TimetableSlot, Violation};
use utoipa::ToSchema;

use crate::error::ApiError;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateIn {
    pub input: SolverInput,
    pub slots: Vec<TimetableSlot>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOut {
    pub score: i64,
    pub violations: Vec<Violation>,
    pub shortfalls: Vec<Shortfall>,
    pub errors: usize,
    pub warnings: usize,
    /// Violation count per kind.
    pub counts: BTreeMap<String, usize>,
}

#[utoipa::path(
    post,
    path = "/v1/evaluate",
    request_body = EvaluateIn,
    responses(
    (status = 200, description = "Violations and score of a displayed timetable", body = EvaluateOut),
    (status = 400, description = "Invalid input or slots")
    )
)]
pub async fn evaluate_handler(Json(body): Json<EvaluateIn>) -> Result<Json<EvaluateOut>, ApiError> {
    let snap = Snapshot::build(&body.input)?;
    let slots = mark_fixed(&snap, &body.slots);
    let placement = Placement::from_slots(&snap, &slots)?;
    let eval = evaluate(&snap, &placement);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for v in &eval.violations {
        let kind = serde_json::to_value(v.r#type)
            .ok()
            .and_then(|x| x.as_str().map(str::to_string))
            .unwrap_or_default();
        *counts.entry(kind).or_default() += 1;
    }
    let errors = eval.error_count();
    Ok(Json(EvaluateOut {
        score: eval.score,
        warnings: eval
            .violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
            .count(),
        errors,
        shortfalls: placement.shortfalls(&snap),
        violations: eval.violations,
        counts,
    }))
}
