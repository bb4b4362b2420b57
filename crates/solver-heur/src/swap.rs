//! Chain-swap proposals for a displayed timetable.
//!
//! A chain moves one occurrence to a new cell; if exactly one movable
//! occurrence stands in the way it is displaced in turn, up to
//! [`MAX_CHAIN`] moves. Nothing is mutated: each chain comes back as a
//! list of reversible [`SlotMove`]s with its score delta.

use std::collections::HashSet;

use timetable_core::scoring;
use timetable_core::{Placement, Snapshot, ValidationError};
use tracing::debug;
use types::{Cell, KomaId, SlotMove, SwapProposal, TimetableSlot};

pub const MAX_CHAIN: usize = 3;
pub const MAX_PROPOSALS: usize = 20;
/// Cap on scored chains per request.
const MAX_EVALS: usize = 20_000;

#[derive(Clone, Copy, Debug)]
struct Step {
    unit: usize,
    from: Cell,
    to: Cell,
}

struct Search<'a> {
    snap: &'a Snapshot,
    base: i64,
    keep_all: bool,
    evals: usize,
    found: Vec<(i64, Vec<Step>)>,
}

impl Search<'_> {
    /// Tries every cell for the lifted unit `u`, which came from `origin`.
    fn place_chain(&mut self, p: &mut Placement, u: usize, origin: Cell, chain: &mut Vec<Step>, moved: &mut Vec<usize>) {
        let snap = self.snap;
        let len = p.unit(u).len;
        for to in snap.grid() {
            if self.evals >= MAX_EVALS {
                return;
            }
            if to == origin || !snap.fits_day(to, len) {
                continue;
            }
            let blockers = p.blockers(snap, u, to);
            if !p.fits(snap, u, to, &blockers) {
                continue;
            }
            let step = Step { unit: u, from: origin, to };
            match blockers.as_slice() {
                [] => {
                    p.place(snap, u, to);
                    chain.push(step);
                    self.record(p, chain);
                    chain.pop();
                    p.lift(snap, u);
                }
                &[b] if chain.len() + 2 <= MAX_CHAIN && p.is_movable(b) && !moved.contains(&b) => {
                    let Some(b_from) = p.lift(snap, b) else {
                        continue;
                    };
                    p.place(snap, u, to);
                    chain.push(step);
                    moved.push(b);
                    self.place_chain(p, b, b_from, chain, moved);
                    moved.pop();
                    chain.pop();
                    p.lift(snap, u);
                    p.place(snap, b, b_from);
                }
                _ => {}
            }
        }
    }

    fn record(&mut self, p: &Placement, chain: &[Step]) {
        self.evals += 1;
        let delta = scoring::score(self.snap, p).total() - self.base;
        if self.keep_all || delta < 0 {
            self.found.push((delta, chain.to_vec()));
        }
    }
}

/// Ranked chains for `slots`, most improving first. With `focus` only
/// chains starting at that koma are explored and non-improving ones are
/// kept too.
pub fn propose_swaps(
    snap: &Snapshot,
    slots: &[TimetableSlot],
    focus: Option<&KomaId>,
) -> Result<Vec<SwapProposal>, ValidationError> {
    let mut p = Placement::from_slots(snap, slots)?;
    let cache = scoring::score(snap, &p);
    let focus_ix = match focus {
        Some(id) => Some(
            snap.koma_ix(id)
                .ok_or_else(|| ValidationError::Msg(format!("unknown koma {id}")))?,
        ),
        None => None,
    };

    let starts: Vec<(usize, Cell)> = p
        .placed()
        .filter(|&(u, c)| {
            p.is_movable(u)
                && match focus_ix {
                    Some(k) => p.unit(u).koma == k,
                    None => cache.day(c.day_of_week) > 0 || cache.total() > 0,
                }
        })
        .collect();

    let mut search = Search {
        snap,
        base: cache.total(),
        keep_all: focus_ix.is_some(),
        evals: 0,
        found: Vec::new(),
    };
    for (u, origin) in starts {
        p.lift(snap, u);
        search.place_chain(&mut p, u, origin, &mut Vec::new(), &mut vec![u]);
        p.place(snap, u, origin);
    }
    debug!(evals = search.evals, found = search.found.len(), "chain search done");

    let mut proposals: Vec<SwapProposal> = search
        .found
        .into_iter()
        .map(|(delta, chain)| to_proposal(snap, &p, delta, &chain))
        .collect();
    proposals.sort_by(|a, b| {
        (a.score_delta, a.moves.len(), &a.description).cmp(&(b.score_delta, b.moves.len(), &b.description))
    });
    let mut seen = HashSet::new();
    proposals.retain(|x| seen.insert(x.description.clone()));
    proposals.truncate(MAX_PROPOSALS);
    Ok(proposals)
}

fn to_proposal(snap: &Snapshot, p: &Placement, delta: i64, chain: &[Step]) -> SwapProposal {
    let moves: Vec<SlotMove> = chain
        .iter()
        .map(|s| {
            let unit = p.unit(s.unit);
            SlotMove {
                koma_id: snap.komas[unit.koma].id.clone(),
                slot_ids: unit.slot_ids.clone(),
                length: unit.len,
                from: s.from,
                to: s.to,
            }
        })
        .collect();
    let description = chain
        .iter()
        .map(|s| format!("{} {} -> {}", snap.koma_label(p.unit(s.unit).koma), s.from, s.to))
        .collect::<Vec<_>>()
        .join("; ");
    SwapProposal {
        moves,
        score_delta: delta,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{slot, InputBuilder};
    use timetable_core::{apply_moves, evaluate};

    #[test]
    fn proposals_improve_and_apply_cleanly() {
        let inp = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 2)
            .koma("e", "eng", &["t2"], &["1A"], 1)
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        let mut slots = vec![slot("a", "m", 0, 1), slot("b", "m", 0, 2), slot("c", "e", 1, 1)];
        let before = evaluate(&snap, &Placement::from_slots(&snap, &slots).unwrap()).score;
        assert!(before > 0);

        let props = propose_swaps(&snap, &slots, None).unwrap();
        assert!(!props.is_empty());
        assert!(props.len() <= MAX_PROPOSALS);
        assert!(props.windows(2).all(|w| w[0].score_delta <= w[1].score_delta));
        let top = &props[0];
        assert!(top.score_delta < 0);

        apply_moves(&snap, &mut slots, &top.moves).unwrap();
        let after = evaluate(&snap, &Placement::from_slots(&snap, &slots).unwrap()).score;
        assert_eq!(after, before + top.score_delta);
    }

    #[test]
    fn blocked_target_is_reached_through_a_chain() {
        // one day, two periods: math needs the slot eng holds
        let mut inp = InputBuilder::new(1, 3)
            .koma("m", "math", &["t1"], &["1A"], 1)
            .koma("e", "eng", &["t2"], &["1A"], 1)
            .only_available("t1", &[(0, 1), (0, 3)])
            .build();
        inp.condition.class_gaps = types::ConditionEntry::consider(50);
        let snap = Snapshot::build(&inp).unwrap();
        let slots = vec![slot("a", "m", 0, 3), slot("b", "e", 0, 1)];
        let props = propose_swaps(&snap, &slots, None).unwrap();
        let chain = props
            .iter()
            .find(|p| p.moves.len() == 2)
            .expect("a two-move chain");
        assert_eq!(chain.moves[0].to, Cell::new(0, 1));
        assert_eq!(chain.moves[1].koma_id.0, "e");
    }

    #[test]
    fn fixed_slots_never_move_and_focus_keeps_neutral_moves() {
        let inp = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 2)
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        let mut pinned = slot("a", "m", 0, 1);
        pinned.is_fixed = true;
        let slots = vec![pinned, slot("b", "m", 2, 1)];

        let none = propose_swaps(&snap, &slots, None).unwrap();
        assert!(none.is_empty(), "already optimal");

        let focused = propose_swaps(&snap, &slots, Some(&"m".into())).unwrap();
        assert!(!focused.is_empty());
        for prop in &focused {
            assert!(prop.moves.iter().all(|m| !m.slot_ids.contains(&"a".into())));
        }
    }

    #[test]
    fn unknown_focus_is_rejected() {
        let inp = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 1)
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        assert!(propose_swaps(&snap, &[], Some(&"ghost".into())).is_err());
    }
}
