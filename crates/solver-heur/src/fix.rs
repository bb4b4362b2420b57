//! Single-move repairs for hard violations.

use std::collections::HashSet;

use timetable_core::scoring::{self, Evaluation, Scope};
use timetable_core::{apply_move, Placement, Snapshot, ValidationError};
use tracing::debug;
use types::{AutoFixSuggestion, Cell, Severity, SlotMove, TimetableSlot, Violation, ViolationKind};

pub const MAX_PER_VIOLATION: usize = 3;

/// Suggestions for every error-severity violation in `slots`, ranked by
/// score delta. Each one removes its target without adding a new error.
pub fn propose_fixes(snap: &Snapshot, slots: &[TimetableSlot]) -> Result<Vec<AutoFixSuggestion>, ValidationError> {
    let mut p = Placement::from_slots(snap, slots)?;
    let before = scoring::evaluate(snap, &p);
    let mut out = Vec::new();

    for (target, scope) in before.scoped_errors() {
        let mut local = Vec::new();
        for u in culprits(snap, &p, target, scope) {
            let Some(origin) = p.pos(u) else {
                continue;
            };
            for to in p.candidates(snap, u, &[]) {
                if to == origin {
                    continue;
                }
                p.relocate(snap, u, Some(to));
                let after = scoring::evaluate(snap, &p);
                p.relocate(snap, u, Some(origin));
                if let Some(s) = suggestion(snap, &p, u, origin, to, target, &before, &after) {
                    local.push(s);
                }
            }
        }
        local.sort_by(|a: &AutoFixSuggestion, b| (a.score_delta, &a.description).cmp(&(b.score_delta, &b.description)));
        local.truncate(MAX_PER_VIOLATION);
        debug!(target = %target.message, found = local.len(), "fix candidates");
        out.extend(local);
    }
    out.sort_by_key(|s| s.score_delta);
    Ok(out)
}

/// Movable occurrences in `scope` that could clear `target` by moving
/// away. Koma-level violations and conflicts only implicate occurrences
/// covering their cell; teacher and class limits implicate the whole day.
fn culprits(snap: &Snapshot, p: &Placement, target: &Violation, scope: Scope) -> Vec<usize> {
    let at_cell = matches!(scope, Scope::Koma(_))
        || matches!(
            target.r#type,
            ViolationKind::TeacherConflict | ViolationKind::ClassConflict | ViolationKind::RoomConflict
        );
    p.placed()
        .filter(|&(u, c)| {
            if !p.is_movable(u) || !scope.involves(snap, p.unit(u).koma) {
                return false;
            }
            match (target.day_of_week, target.period) {
                (Some(d), Some(per)) if at_cell => p.covers(u, Cell::new(d, per)),
                (Some(d), _) => c.day_of_week == d,
                _ => true,
            }
        })
        .map(|(u, _)| u)
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn suggestion(
    snap: &Snapshot,
    p: &Placement,
    u: usize,
    from: Cell,
    to: Cell,
    target: &Violation,
    before: &Evaluation,
    after: &Evaluation,
) -> Option<AutoFixSuggestion> {
    let in_list = |v: &Violation, list: &[Violation]| list.iter().any(|w| w.key() == v.key());
    if in_list(target, &after.violations) {
        return None;
    }
    let new: Vec<Violation> = after
        .violations
        .iter()
        .filter(|v| !in_list(v, &before.violations))
        .cloned()
        .collect();
    if new.iter().any(|v| v.severity == Severity::Error) {
        return None;
    }
    let removed: Vec<Violation> = before
        .violations
        .iter()
        .filter(|v| !in_list(v, &after.violations))
        .cloned()
        .collect();
    let unit = p.unit(u);
    Some(AutoFixSuggestion {
        target: target.clone(),
        r#move: SlotMove {
            koma_id: snap.komas[unit.koma].id.clone(),
            slot_ids: unit.slot_ids.clone(),
            length: unit.len,
            from,
            to,
        },
        removed_violations: removed,
        new_violations: new,
        score_delta: after.score - before.score,
        description: format!("move {} {} -> {}: {}", snap.koma_label(unit.koma), from, to, target.message),
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<usize>,
    pub skipped: Vec<usize>,
}

/// Applies `suggestions` in order, skipping any whose source slots have
/// moved or whose target cells an earlier suggestion already filled.
pub fn apply_all(snap: &Snapshot, slots: &mut [TimetableSlot], suggestions: &[AutoFixSuggestion]) -> ApplyReport {
    let mut report = ApplyReport::default();
    let mut filled: HashSet<Cell> = HashSet::new();
    for (i, s) in suggestions.iter().enumerate() {
        let mv = &s.r#move;
        let cells: Vec<Cell> = (0..mv.length)
            .map(|off| Cell::new(mv.to.day_of_week, mv.to.period + off))
            .collect();
        if cells.iter().any(|c| filled.contains(c)) {
            report.skipped.push(i);
            continue;
        }
        match apply_move(snap, slots, mv) {
            Ok(()) => {
                filled.extend(cells);
                report.applied.push(i);
            }
            Err(e) => {
                debug!(index = i, error = %e, "suggestion skipped");
                report.skipped.push(i);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{slot, InputBuilder};
    use types::{ConditionEntry, ScheduleCondition};

    fn eval(snap: &Snapshot, slots: &[TimetableSlot]) -> Evaluation {
        scoring::evaluate(snap, &Placement::from_slots(snap, slots).unwrap())
    }

    #[test]
    fn top_fix_clears_the_only_error() {
        let inp = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 1)
            .koma("e", "eng", &["t2"], &["1A"], 1)
            .only_available("t1", &[(1, 1), (1, 2), (3, 4)])
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        let mut slots = vec![slot("a", "m", 0, 1), slot("b", "e", 1, 1)];
        let before = eval(&snap, &slots);
        assert_eq!(before.error_count(), 1);

        let fixes = propose_fixes(&snap, &slots).unwrap();
        assert!(!fixes.is_empty() && fixes.len() <= MAX_PER_VIOLATION);
        let top = &fixes[0];
        assert_eq!(top.target.r#type, ViolationKind::TeacherUnavailable);
        assert!(top.new_violations.iter().all(|v| v.severity == Severity::Warning));
        assert!(top.removed_violations.iter().any(|v| v.key() == top.target.key()));

        apply_move(&snap, &mut slots, &top.r#move).unwrap();
        assert_eq!(eval(&snap, &slots).error_count(), 0);
    }

    #[test]
    fn conflict_can_be_fixed_by_either_side_but_never_a_fixed_one() {
        let inp = InputBuilder::new(5, 6)
            .koma("a", "math", &["t1"], &["1A"], 1)
            .koma("b", "eng", &["t1"], &["1B"], 1)
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        let mut pinned = slot("x", "a", 2, 2);
        pinned.is_fixed = true;
        let slots = vec![pinned, slot("y", "b", 2, 2)];
        let fixes = propose_fixes(&snap, &slots).unwrap();
        assert!(!fixes.is_empty());
        assert!(fixes.iter().all(|f| f.r#move.koma_id.0 == "b"));
        assert!(fixes.iter().all(|f| f.new_violations.iter().all(|v| v.severity != Severity::Error)));
    }

    #[test]
    fn forbidden_teacher_day_cap_gets_a_fix() {
        let mut inp = InputBuilder::new(5, 6)
            .koma("m1", "math", &["t1"], &["1A"], 1)
            .koma("m2", "eng", &["t1"], &["1B"], 1)
            .condition(ScheduleCondition {
                teacher_max_per_day: ConditionEntry::forbidden(),
                ..ScheduleCondition::default()
            })
            .build();
        inp.teachers.iter_mut().find(|t| t.id.0 == "t1").unwrap().max_per_day = Some(1);
        let snap = Snapshot::build(&inp).unwrap();
        let mut slots = vec![slot("a", "m1", 0, 1), slot("b", "m2", 0, 3)];
        let before = eval(&snap, &slots);
        let hard: Vec<ViolationKind> = before.errors().map(|v| v.r#type).collect();
        assert_eq!(hard, vec![ViolationKind::TeacherMaxPerDay]);
        assert_eq!(before.errors().next().unwrap().koma_id, None);

        let fixes = propose_fixes(&snap, &slots).unwrap();
        assert!(!fixes.is_empty());
        let top = &fixes[0];
        assert_eq!(top.target.r#type, ViolationKind::TeacherMaxPerDay);
        assert_ne!(top.r#move.to.day_of_week, 0);

        apply_move(&snap, &mut slots, &top.r#move).unwrap();
        assert_eq!(eval(&snap, &slots).error_count(), 0);
    }

    #[test]
    fn subject_day_cap_can_move_any_koma_of_the_subject() {
        let inp = InputBuilder::new(5, 6)
            .koma("m1", "math", &["t1"], &["1A"], 1)
            .koma("m2", "math", &["t2"], &["1A"], 1)
            .condition(ScheduleCondition {
                subject_max_per_day: ConditionEntry::forbidden(),
                ..ScheduleCondition::default()
            })
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        let mut first = slot("a", "m1", 0, 1);
        first.is_fixed = true;
        let mut second = first.clone();
        second.id = "b".into();
        second.koma_id = "m2".into();
        second.period = 2;
        second.is_fixed = false;
        for slots in [vec![first.clone(), second.clone()], vec![second, first]] {
            let fixes = propose_fixes(&snap, &slots).unwrap();
            assert!(!fixes.is_empty());
            assert!(fixes.iter().all(|f| f.target.r#type == ViolationKind::SubjectMaxPerDay));
            assert!(fixes.iter().all(|f| f.r#move.koma_id.0 == "m2"));
        }
    }

    #[test]
    fn apply_all_skips_invalidated_suggestions() {
        let inp = InputBuilder::new(5, 6)
            .koma("m", "math", &["t1"], &["1A"], 1)
            .only_available("t1", &[(4, 6)])
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        let mut slots = vec![slot("a", "m", 0, 1)];
        let fixes = propose_fixes(&snap, &slots).unwrap();
        assert_eq!(fixes.len(), 1);
        let twice = vec![fixes[0].clone(), fixes[0].clone()];
        let report = apply_all(&snap, &mut slots, &twice);
        assert_eq!(report.applied, vec![0]);
        assert_eq!(report.skipped, vec![1]);
        assert_eq!(slots[0].cell(), Cell::new(4, 6));
    }
}
