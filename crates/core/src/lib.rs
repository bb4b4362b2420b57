pub mod control;
pub mod edit;
pub mod placement;
pub mod scoring;
pub mod snapshot;

use thiserror::Error;

pub use control::{CancelToken, ProgressSink, RunContext};
pub use edit::{apply_move, apply_moves, EditError};
pub use placement::{Placement, Unit};
pub use scoring::{evaluate, Evaluation, Scope, ScoreCache, FORBIDDEN_PENALTY};
pub use snapshot::Snapshot;
pub use types::{
    Cell, Koma, KomaId, SolverConfig, SolverInput, SolverProgress, SolverResult, TimetableSlot,
    Violation,
};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid input: {0}")]
    Msg(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("run aborted")]
    Aborted,
    #[error("internal invariant breached: {0}")]
    Internal(String),
}

pub const MAX_TIME_MS: (u64, u64) = (10_000, 300_000);
pub const MAX_PATTERNS: (u64, u64) = (1, 10);
pub const ILS_RESTARTS: (u64, u64) = (1, 20);

pub fn validate_config(cfg: &SolverConfig) -> Result<(), ConfigError> {
    fn within(field: &'static str, (min, max): (u64, u64), value: u64) -> Result<(), ConfigError> {
        if value < min || value > max {
            return Err(ConfigError::OutOfRange {
                field,
                min,
                max,
                value,
            });
        }
        Ok(())
    }
    within("maxTimeMs", MAX_TIME_MS, cfg.max_time_ms)?;
    within("maxPatterns", MAX_PATTERNS, cfg.max_patterns as u64)?;
    within("ilsRestarts", ILS_RESTARTS, cfg.ils_restarts as u64)?;
    Ok(())
}

/// Copies `slots`, pinning the ones the input declares fixed.
pub fn mark_fixed(snap: &Snapshot, slots: &[TimetableSlot]) -> Vec<TimetableSlot> {
    slots
        .iter()
        .map(|s| {
            let mut s = s.clone();
            if snap.fixed.iter().any(|f| f.id == s.id) {
                s.is_fixed = true;
                s.placed_by = types::PlacedBy::Fixed;
            }
            s
        })
        .collect()
}

/// A timetable generator run on a dedicated background thread.
///
/// Implementations poll `ctx` at every loop boundary and return
/// [`SolveError::Aborted`] once cancellation is requested. The returned
/// patterns are ranked best first.
pub trait Solver: Send + Sync + 'static {
    fn solve(
        &self,
        input: &SolverInput,
        config: &SolverConfig,
        ctx: &mut RunContext,
    ) -> Result<Vec<SolverResult>, SolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_ranges_are_enforced() {
        let mut cfg = SolverConfig {
            max_time_ms: 10_000,
            max_patterns: 1,
            ils_restarts: 1,
            seed: 0,
        };
        assert!(validate_config(&cfg).is_ok());
        cfg.max_patterns = 11;
        assert_eq!(
            validate_config(&cfg),
            Err(ConfigError::OutOfRange {
                field: "maxPatterns",
                min: 1,
                max: 10,
                value: 11
            })
        );
        cfg.max_patterns = 1;
        cfg.max_time_ms = 5;
        assert!(validate_config(&cfg).is_err());
    }
}
