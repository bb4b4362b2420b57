//! Greedy initial construction.
//!
//! Occurrences are placed one at a time, highest priority first and then
//! most constrained first. Each goes to the hard-feasible cell with the
//! smallest score increase; ties go to the lowest `(day, period)`, or to a
//! seeded random pick among the tied cells when `vary` is set.

use rand::seq::SliceRandom;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cmp::Reverse;
use timetable_core::scoring;
use timetable_core::{Placement, RunContext, SolveError, Snapshot};
use tracing::debug;
use types::{Cell, Phase};

use crate::{Progress, State};

pub fn construct(
    snap: &Snapshot,
    seed: u64,
    vary: bool,
    progress: Progress,
    ctx: &mut RunContext,
) -> Result<State, SolveError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut state = State::new(snap, Placement::for_solver(snap));
    let mut pending: Vec<usize> = state.placement.unplaced().collect();

    while !pending.is_empty() {
        ctx.checkpoint()?;
        let p = &state.placement;
        let (i, options) = pending
            .iter()
            .enumerate()
            .map(|(i, &u)| (i, p.candidates(snap, u, &[])))
            .max_by_key(|(i, options)| {
                let u = pending[*i];
                let unit = p.unit(u);
                (
                    snap.komas[unit.koma].priority,
                    Reverse(options.len()),
                    unit.len,
                    Reverse(u),
                )
            })
            .ok_or_else(|| SolveError::Internal("empty pending set".into()))?;
        let u = pending.swap_remove(i);

        if options.is_empty() {
            debug!(
                koma = %snap.komas[state.placement.unit(u).koma].id,
                "no feasible cell, left unplaced"
            );
            continue;
        }

        let mut best: Vec<(Cell, scoring::ScoreCache)> = Vec::new();
        let mut best_score = i64::MAX;
        for cell in options {
            state.placement.place(snap, u, cell);
            let cache = scoring::rescore(snap, &state.placement, &state.cache, &[cell.day_of_week]);
            state.placement.lift(snap, u);
            let s = cache.total();
            if s < best_score {
                best_score = s;
                best.clear();
            }
            if s == best_score {
                best.push((cell, cache));
            }
        }
        let pick = if vary {
            best.choose(&mut rng).cloned()
        } else {
            best.into_iter().next()
        };
        let Some((cell, cache)) = pick else {
            continue;
        };
        state.placement.place(snap, u, cell);
        state.cache = cache;
        progress.emit(ctx, Phase::Construct, &state, None);
    }
    Ok(state)
}
