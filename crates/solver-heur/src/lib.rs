pub mod construct;
pub mod fix;
pub mod ils;
pub mod swap;

use std::time::{Duration, Instant};

use timetable_core::scoring::{self, ScoreCache};
use timetable_core::{validate_config, Placement, RunContext, SolveError, Solver, Snapshot};
use tracing::{debug, info};
use types::{Phase, PatternId, SolverConfig, SolverInput, SolverProgress, SolverResult};

pub use fix::{apply_all, propose_fixes, ApplyReport};
pub use swap::propose_swaps;

pub struct HeurSolver;

impl HeurSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeurSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// A placement together with its cached score components.
#[derive(Clone, Debug)]
pub struct State {
    pub placement: Placement,
    pub cache: ScoreCache,
}

impl State {
    pub fn new(snap: &Snapshot, placement: Placement) -> Self {
        let cache = scoring::score(snap, &placement);
        Self { placement, cache }
    }

    pub fn score(&self) -> i64 {
        self.cache.total()
    }

    /// Lower is better: score first, then unplaced periods.
    pub fn fitness(&self) -> (i64, u32) {
        (self.cache.total(), self.placement.unplaced_periods())
    }

    pub fn is_perfect(&self) -> bool {
        self.fitness() == (0, 0)
    }
}

/// Identifies the pattern a progress event belongs to.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    pub pattern: u8,
    pub patterns: u8,
    pub total_periods: u32,
}

impl Progress {
    pub fn emit(&self, ctx: &mut RunContext, phase: Phase, state: &State, message: Option<String>) {
        let elapsed_ms = ctx.elapsed_ms();
        ctx.report(SolverProgress {
            phase_label: phase,
            placed_count: state.placement.placed_periods(),
            total_komas: self.total_periods,
            pattern_index: self.pattern,
            total_patterns: self.patterns,
            score: state.score(),
            elapsed_ms,
            message,
        });
    }
}

pub(crate) fn pattern_seed(seed: u64, pattern: u8) -> u64 {
    seed ^ (pattern as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl Solver for HeurSolver {
    fn solve(
        &self,
        input: &SolverInput,
        config: &SolverConfig,
        ctx: &mut RunContext,
    ) -> Result<Vec<SolverResult>, SolveError> {
        validate_config(config)?;
        let snap = Snapshot::build(input)?;
        let total_periods: u32 = snap.komas.iter().map(|k| k.count as u32).sum();
        let patterns = config.max_patterns;
        let end = ctx.started() + Duration::from_millis(config.max_time_ms);
        info!(
            komas = snap.komas.len(),
            periods = total_periods,
            patterns,
            restarts = config.ils_restarts,
            "solve started"
        );

        let mut results = Vec::with_capacity(patterns as usize);
        for i in 0..patterns {
            ctx.checkpoint()?;
            let now = Instant::now();
            let share = end.saturating_duration_since(now) / (patterns - i) as u32;
            let progress = Progress {
                pattern: i,
                patterns,
                total_periods,
            };
            let r = run_pattern(&snap, config, progress, now + share, ctx)?;
            info!(pattern = i, score = r.score, complete = r.is_complete, "pattern done");
            results.push(r);
        }
        rank(&mut results);
        Ok(results)
    }
}

fn run_pattern(
    snap: &Snapshot,
    config: &SolverConfig,
    progress: Progress,
    deadline: Instant,
    ctx: &mut RunContext,
) -> Result<SolverResult, SolveError> {
    let seed = pattern_seed(config.seed, progress.pattern);
    let built = construct::construct(snap, seed, progress.pattern > 0, progress, ctx)?;
    let construct_score = built.score();
    debug!(
        pattern = progress.pattern,
        score = construct_score,
        unplaced = built.placement.unplaced_periods(),
        "constructed"
    );

    let budget = ils::Budget {
        deadline,
        restarts: config.ils_restarts,
    };
    let (best, stats) = ils::optimize(snap, built, seed, budget, progress, ctx)?;
    progress.emit(ctx, Phase::Done, &best, None);

    let pattern_id = PatternId(format!("pattern-{}", progress.pattern));
    let eval = scoring::evaluate(snap, &best.placement);
    if eval.score != best.score() {
        return Err(SolveError::Internal(format!(
            "cached score {} differs from full evaluation {}",
            best.score(),
            eval.score
        )));
    }
    let shortfalls = best.placement.shortfalls(snap);
    let is_complete = shortfalls.is_empty() && eval.error_count() == 0;
    Ok(SolverResult {
        pattern_id: pattern_id.clone(),
        assignments: best.placement.to_slots(snap, &pattern_id),
        violations: eval.violations,
        shortfalls,
        score: eval.score,
        is_complete,
        elapsed_ms: ctx.elapsed_ms(),
        stats: serde_json::json!({
            "method": "ils",
            "constructScore": construct_score,
            "restarts": stats.restarts,
            "moves": stats.moves,
            "improvements": stats.improvements,
        }),
    })
}

/// Complete patterns first, then by score; ties keep generation order.
fn rank(results: &mut [SolverResult]) {
    results.sort_by_key(|r| (!r.is_complete, r.score));
}
