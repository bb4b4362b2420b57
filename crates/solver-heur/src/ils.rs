//! Iterated local search over a constructed placement.
//!
//! Best-improvement descent over relocations and swaps, then restarts from
//! a perturbed copy of the best state found so far.

use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use timetable_core::scoring;
use timetable_core::{Placement, RunContext, SolveError, Snapshot};
use tracing::debug;
use types::{Cell, Phase};

use crate::{Progress, State};

const MAX_PERTURB_MOVES: usize = 8;

#[derive(Clone, Copy, Debug)]
pub struct Budget {
    pub deadline: Instant,
    pub restarts: u8,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IlsStats {
    pub restarts: u32,
    pub moves: u64,
    pub improvements: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Move {
    Relocate { unit: usize, to: Cell },
    Swap { a: usize, b: usize },
}

enum Undo {
    Relocate(usize, Option<Cell>),
    Swap(usize, Cell, usize, Cell),
}

pub fn optimize(
    snap: &Snapshot,
    init: State,
    seed: u64,
    budget: Budget,
    progress: Progress,
    ctx: &mut RunContext,
) -> Result<(State, IlsStats), SolveError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut stats = IlsStats::default();
    let mut best = init;
    local_improve(snap, &mut best, budget.deadline, ctx, &mut stats)?;
    progress.emit(ctx, Phase::Optimize, &best, Some("descent".into()));

    for r in 0..budget.restarts {
        if best.is_perfect() || Instant::now() >= budget.deadline {
            break;
        }
        ctx.checkpoint()?;
        let mut cur = best.clone();
        perturb(snap, &mut cur, &mut rng, &mut stats);
        local_improve(snap, &mut cur, budget.deadline, ctx, &mut stats)?;
        stats.restarts += 1;
        if cur.fitness() < best.fitness() {
            debug!(restart = r, from = ?best.fitness(), to = ?cur.fitness(), "improved");
            best = cur;
            stats.improvements += 1;
        }
        progress.emit(
            ctx,
            Phase::Optimize,
            &best,
            Some(format!("restart {}/{}", r + 1, budget.restarts)),
        );
    }
    Ok((best, stats))
}

/// Descends until no relocation or swap improves the fitness or the
/// deadline passes.
pub fn local_improve(
    snap: &Snapshot,
    st: &mut State,
    deadline: Instant,
    ctx: &RunContext,
    stats: &mut IlsStats,
) -> Result<(), SolveError> {
    loop {
        let base = st.fitness();
        let mut best: Option<((i64, u32), Move)> = None;
        let mut consider = |fit: (i64, u32), mv: Move| {
            if fit < base && best.map_or(true, |(f, _)| fit < f) {
                best = Some((fit, mv));
            }
        };

        for unit in 0..st.placement.len() {
            ctx.checkpoint()?;
            if Instant::now() >= deadline {
                return Ok(());
            }
            if !st.placement.is_movable(unit) {
                continue;
            }
            let from = st.placement.pos(unit);
            for to in st.placement.candidates(snap, unit, &[]) {
                if Some(to) == from {
                    continue;
                }
                let mv = Move::Relocate { unit, to };
                if let Some(fit) = trial(snap, st, mv) {
                    consider(fit, mv);
                }
            }
        }

        let hot: Vec<usize> = st
            .placement
            .placed()
            .filter(|&(u, c)| st.placement.is_movable(u) && st.cache.day(c.day_of_week) > 0)
            .map(|(u, _)| u)
            .collect();
        for &a in &hot {
            ctx.checkpoint()?;
            if Instant::now() >= deadline {
                return Ok(());
            }
            for b in 0..st.placement.len() {
                if b == a || (b < a && hot.contains(&b)) || !swappable(&st.placement, a, b) {
                    continue;
                }
                let mv = Move::Swap { a, b };
                if let Some(fit) = trial(snap, st, mv) {
                    consider(fit, mv);
                }
            }
        }

        match best {
            Some((_, mv)) => {
                commit(snap, st, mv);
                stats.moves += 1;
            }
            None => return Ok(()),
        }
    }
}

fn swappable(p: &Placement, a: usize, b: usize) -> bool {
    p.is_movable(a)
        && p.is_movable(b)
        && p.pos(a).is_some()
        && p.pos(b).is_some()
        && p.unit(a).len == p.unit(b).len
        && p.unit(a).koma != p.unit(b).koma
}

/// Exchanges the cells of `a` and `b` if both fit; otherwise leaves the
/// placement as it was.
pub(crate) fn swap_units(snap: &Snapshot, p: &mut Placement, a: usize, b: usize) -> bool {
    let (Some(ca), Some(cb)) = (p.pos(a), p.pos(b)) else {
        return false;
    };
    p.lift(snap, a);
    p.lift(snap, b);
    if p.fits(snap, a, cb, &[]) {
        p.place(snap, a, cb);
        if p.fits(snap, b, ca, &[]) {
            p.place(snap, b, ca);
            return true;
        }
        p.lift(snap, a);
    }
    p.place(snap, a, ca);
    p.place(snap, b, cb);
    false
}

fn apply(snap: &Snapshot, p: &mut Placement, mv: Move) -> Option<(Undo, Vec<u8>)> {
    match mv {
        Move::Relocate { unit, to } => {
            let from = p.relocate(snap, unit, Some(to));
            let mut days = vec![to.day_of_week];
            if let Some(f) = from {
                if f.day_of_week != to.day_of_week {
                    days.push(f.day_of_week);
                }
            }
            Some((Undo::Relocate(unit, from), days))
        }
        Move::Swap { a, b } => {
            let (ca, cb) = (p.pos(a)?, p.pos(b)?);
            if !swap_units(snap, p, a, b) {
                return None;
            }
            let mut days = vec![ca.day_of_week];
            if cb.day_of_week != ca.day_of_week {
                days.push(cb.day_of_week);
            }
            Some((Undo::Swap(a, ca, b, cb), days))
        }
    }
}

fn undo(snap: &Snapshot, p: &mut Placement, undo: Undo) {
    match undo {
        Undo::Relocate(u, from) => {
            p.relocate(snap, u, from);
        }
        Undo::Swap(a, ca, b, cb) => {
            p.lift(snap, a);
            p.lift(snap, b);
            p.place(snap, a, ca);
            p.place(snap, b, cb);
        }
    }
}

fn trial(snap: &Snapshot, st: &mut State, mv: Move) -> Option<(i64, u32)> {
    let (u, days) = apply(snap, &mut st.placement, mv)?;
    let score = scoring::rescore(snap, &st.placement, &st.cache, &days).total();
    let fit = (score, st.placement.unplaced_periods());
    undo(snap, &mut st.placement, u);
    Some(fit)
}

fn commit(snap: &Snapshot, st: &mut State, mv: Move) {
    if let Some((_, days)) = apply(snap, &mut st.placement, mv) {
        st.cache = scoring::rescore(snap, &st.placement, &st.cache, &days);
    }
}

pub fn perturb(snap: &Snapshot, st: &mut State, rng: &mut ChaCha8Rng, stats: &mut IlsStats) {
    let movable: Vec<usize> = (0..st.placement.len())
        .filter(|&u| st.placement.is_movable(u))
        .collect();
    let strength = (1 + movable.len() / 10).min(MAX_PERTURB_MOVES);
    for _ in 0..strength {
        let Some(&u) = movable.choose(rng) else {
            return;
        };
        if rng.gen_bool(0.5) {
            let cells = st.placement.candidates(snap, u, &[]);
            if let Some(&to) = cells.choose(rng) {
                st.placement.relocate(snap, u, Some(to));
                stats.moves += 1;
            }
        } else {
            let partners: Vec<usize> = movable
                .iter()
                .copied()
                .filter(|&b| b != u && swappable(&st.placement, u, b))
                .collect();
            if let Some(&b) = partners.choose(rng) {
                if swap_units(snap, &mut st.placement, u, b) {
                    stats.moves += 1;
                }
            }
        }
    }
    st.cache = scoring::score(snap, &st.placement);
}
