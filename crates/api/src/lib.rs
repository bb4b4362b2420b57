//! HTTP surface of the timetable generator.

pub mod config;
mod error;
pub mod state;
pub mod telemetry;
pub mod routes {
    pub mod evaluate;
    pub mod health;
    pub mod jobs;
    pub mod proposals;
    pub mod solve;
    pub mod validate;
}

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;

#[derive(OpenApi)]
#[openapi(
        paths(
            routes::health::health,
            routes::validate::validate_handler,
            routes::evaluate::evaluate_handler,
            routes::solve::solve,
            routes::jobs::status,
            routes::jobs::result,
            routes::jobs::abort,
            routes::proposals::swaps,
            routes::proposals::fixes,
            routes::proposals::apply_fixes,
        ),
        components(schemas(
            types::SolverInput, types::School, types::ClassInfo, types::Subject, types::Teacher,
            types::Availability, types::AvailabilityStatus, types::Room, types::Duty, types::Koma,
            types::KomaType, types::KomaTeacher, types::TeacherRole, types::ScheduleCondition,
            types::ConditionEntry, types::ConstraintLevel, types::PerSubjectCondition,
            types::PlacementRestriction, types::TimetableSlot, types::PlacedBy, types::Cell,
            types::SolverConfig, types::SolverResult, types::Violation, types::ViolationKind,
            types::Severity, types::Shortfall, types::SolverProgress, types::Phase,
            types::SlotMove, types::SwapProposal, types::AutoFixSuggestion, types::SolverMessage,
            types::SchoolId, types::KomaId, types::SubjectId, types::GradeId, types::TeacherId,
            types::ClassId, types::RoomId, types::DutyId, types::SlotId, types::PatternId,
            jobs::JobId, jobs::JobStatus, jobs::RunState,
            routes::health::Health,
            routes::validate::ValidateIn,
            routes::validate::ValidationReport,
            routes::evaluate::EvaluateIn,
            routes::evaluate::EvaluateOut,
            routes::solve::SolveIn,
            routes::solve::JobCreated,
            routes::proposals::SwapsIn,
            routes::proposals::FixesIn,
            routes::proposals::ApplyFixesIn,
            routes::proposals::ApplyFixesOut,
        )),
        tags(
            (name = "koma", description = "Weekly timetable generation and repair")
        )
    )]
pub struct ApiDoc;

pub fn app(state: state::AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/v1/health", get(routes::health::health))
        .route("/v1/validate", post(routes::validate::validate_handler))
        .route("/v1/evaluate", post(routes::evaluate::evaluate_handler))
        .route("/v1/solve", post(routes::solve::solve))
        .route("/v1/jobs/:id", get(routes::jobs::status))
        .route("/v1/jobs/:id/result", get(routes::jobs::result))
        .route("/v1/jobs/:id/abort", post(routes::jobs::abort))
        .route("/v1/proposals/swaps", post(routes::proposals::swaps))
        .route("/v1/proposals/fixes", post(routes::proposals::fixes))
        .route("/v1/proposals/fixes/apply", post(routes::proposals::apply_fixes))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(telemetry::stack(body_limit))
        .with_state(state)
}
