//! Constraint evaluation.
//!
//! Every check is a variant of [`Check`]. Daily checks only look at the
//! units placed on one day, weekly checks look at totals, so the score
//! splits into one component per day plus a weekly component. [`rescore`]
//! recomputes just the days a move touched; it runs the same code as
//! [`score`] and therefore always agrees with a full evaluation.

use std::collections::BTreeMap;

use types::{Cell, ConstraintLevel, PlacementRestriction, Severity, Violation, ViolationKind};

use crate::placement::Placement;
use crate::snapshot::Snapshot;

/// Penalty of a breached `forbidden`-level or structural constraint.
pub const FORBIDDEN_PENALTY: i64 = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    Conflicts,
    Availability,
    Consecutive,
    SubjectPerDay,
    Restriction,
    TeacherPerDay,
    TeacherConsecutive,
    TeacherPreference,
    ClassGaps,
    Overplaced,
    TeacherPerWeek,
    SubjectDistribution,
}

impl Check {
    pub const DAILY: [Check; 9] = [
        Check::Conflicts,
        Check::Availability,
        Check::Consecutive,
        Check::SubjectPerDay,
        Check::Restriction,
        Check::TeacherPerDay,
        Check::TeacherConsecutive,
        Check::TeacherPreference,
        Check::ClassGaps,
    ];

    pub const WEEKLY: [Check; 3] = [
        Check::Overplaced,
        Check::TeacherPerWeek,
        Check::SubjectDistribution,
    ];
}

#[derive(Clone, Copy, Debug)]
struct Grade {
    severity: Severity,
    penalty: i64,
}

const HARD: Grade = Grade {
    severity: Severity::Error,
    penalty: FORBIDDEN_PENALTY,
};

fn grade(level: ConstraintLevel, weight: u32) -> Option<Grade> {
    match level {
        ConstraintLevel::Forbidden => Some(HARD),
        ConstraintLevel::Consider => Some(Grade {
            severity: Severity::Warning,
            penalty: weight as i64,
        }),
        ConstraintLevel::Ignore => None,
    }
}

/// What a violation is about: the occurrences that could clear it are
/// the ones using this koma or resource where the violation sits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    Anywhere,
    Koma(usize),
    Teacher(usize),
    Class(usize),
    Room(usize),
    ClassSubject { class: usize, subject: usize },
}

impl Scope {
    /// Whether koma `k` takes part in this scope.
    pub fn involves(&self, snap: &Snapshot, k: usize) -> bool {
        let info = &snap.komas[k];
        match *self {
            Scope::Anywhere => true,
            Scope::Koma(x) => x == k,
            Scope::Teacher(t) => info.teachers.contains(&t),
            Scope::Class(c) => info.classes.contains(&c),
            Scope::Room(r) => info.rooms.contains(&r),
            Scope::ClassSubject { class, subject } => {
                info.subject == subject && info.classes.contains(&class)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct At {
    day: Option<u8>,
    period: Option<u8>,
    koma: Option<usize>,
    scope: Scope,
}

impl At {
    fn cell(cell: Cell, koma: Option<usize>) -> Self {
        Self {
            day: Some(cell.day_of_week),
            period: Some(cell.period),
            koma,
            scope: koma.map(Scope::Koma).unwrap_or_default(),
        }
    }

    fn day(day: u8, koma: Option<usize>) -> Self {
        Self {
            day: Some(day),
            period: None,
            koma,
            scope: koma.map(Scope::Koma).unwrap_or_default(),
        }
    }

    fn week(scope: Scope) -> Self {
        Self {
            scope,
            koma: match scope {
                Scope::Koma(k) => Some(k),
                _ => None,
            },
            ..Self::default()
        }
    }

    fn scoped(self, scope: Scope) -> Self {
        Self { scope, ..self }
    }
}

trait Sink {
    fn hit(&mut self, kind: ViolationKind, grade: Grade, at: At, message: impl FnOnce() -> String);
}

/// Score-only sink for the search hot path; messages are never built.
#[derive(Default)]
struct Tally(i64);

impl Sink for Tally {
    fn hit(&mut self, _: ViolationKind, grade: Grade, _: At, _: impl FnOnce() -> String) {
        self.0 += grade.penalty;
    }
}

struct Report<'s> {
    snap: &'s Snapshot,
    violations: Vec<Violation>,
    scopes: Vec<Scope>,
    score: i64,
}

impl Sink for Report<'_> {
    fn hit(&mut self, kind: ViolationKind, grade: Grade, at: At, message: impl FnOnce() -> String) {
        self.score += grade.penalty;
        self.scopes.push(at.scope);
        self.violations.push(Violation {
            r#type: kind,
            message: message(),
            severity: grade.severity,
            day_of_week: at.day,
            period: at.period,
            koma_id: at.koma.map(|k| self.snap.komas[k].id.clone()),
        });
    }
}

#[derive(Clone, Debug)]
pub struct Evaluation {
    pub violations: Vec<Violation>,
    /// `scopes[i]` is what `violations[i]` is about.
    pub scopes: Vec<Scope>,
    pub score: i64,
}

impl Evaluation {
    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
    }

    pub fn scoped_errors(&self) -> impl Iterator<Item = (&Violation, Scope)> {
        self.violations
            .iter()
            .zip(self.scopes.iter().copied())
            .filter(|(v, _)| v.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }
}

/// Per-day score components plus the weekly one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreCache {
    days: Vec<i64>,
    week: i64,
}

impl ScoreCache {
    pub fn total(&self) -> i64 {
        self.days.iter().sum::<i64>() + self.week
    }

    pub fn day(&self, day: u8) -> i64 {
        self.days[day as usize]
    }
}

/// Full evaluation with messages, in day order then weekly checks.
pub fn evaluate(snap: &Snapshot, p: &Placement) -> Evaluation {
    let mut sink = Report {
        snap,
        violations: Vec::new(),
        scopes: Vec::new(),
        score: 0,
    };
    for d in 0..snap.days {
        scan_day(snap, p, d, &mut sink);
    }
    scan_week(snap, p, &mut sink);
    Evaluation {
        violations: sink.violations,
        scopes: sink.scopes,
        score: sink.score,
    }
}

pub fn score(snap: &Snapshot, p: &Placement) -> ScoreCache {
    let days = (0..snap.days)
        .map(|d| {
            let mut t = Tally::default();
            scan_day(snap, p, d, &mut t);
            t.0
        })
        .collect();
    let mut t = Tally::default();
    scan_week(snap, p, &mut t);
    ScoreCache { days, week: t.0 }
}

/// Rescores after a move that only touched `days`.
pub fn rescore(snap: &Snapshot, p: &Placement, prev: &ScoreCache, days: &[u8]) -> ScoreCache {
    let mut next = prev.clone();
    for &d in days {
        let mut t = Tally::default();
        scan_day(snap, p, d, &mut t);
        next.days[d as usize] = t.0;
    }
    let mut t = Tally::default();
    scan_week(snap, p, &mut t);
    next.week = t.0;
    next
}

struct DayView {
    day: u8,
    periods: u8,
    /// units per period, index 0 unused
    at: Vec<Vec<usize>>,
    units: Vec<(usize, Cell)>,
}

impl DayView {
    fn new(snap: &Snapshot, p: &Placement, day: u8) -> Self {
        let periods = snap.periods_on(day);
        let mut at = vec![Vec::new(); periods as usize + 1];
        let units: Vec<(usize, Cell)> = p.on_day(day).collect();
        for &(u, c) in &units {
            for off in 0..p.unit(u).len {
                if let Some(slot) = at.get_mut((c.period + off) as usize) {
                    slot.push(u);
                }
            }
        }
        Self {
            day,
            periods,
            at,
            units,
        }
    }

    fn cell(&self, period: u8) -> Cell {
        Cell::new(self.day, period)
    }
}

fn scan_day<S: Sink>(snap: &Snapshot, p: &Placement, day: u8, sink: &mut S) {
    let view = DayView::new(snap, p, day);
    if view.units.is_empty() {
        return;
    }
    for check in Check::DAILY {
        match check {
            Check::Conflicts => conflicts(snap, p, &view, sink),
            Check::Availability => availability(snap, p, &view, sink),
            Check::Consecutive => consecutive(snap, p, &view, sink),
            Check::SubjectPerDay => subject_per_day(snap, p, &view, sink),
            Check::Restriction => restriction(snap, p, &view, sink),
            Check::TeacherPerDay => teacher_per_day(snap, p, &view, sink),
            Check::TeacherConsecutive => teacher_consecutive(snap, p, &view, sink),
            Check::TeacherPreference => teacher_preference(snap, p, &view, sink),
            Check::ClassGaps => class_gaps(snap, p, &view, sink),
            _ => unreachable!("weekly check in daily scan"),
        }
    }
}

fn scan_week<S: Sink>(snap: &Snapshot, p: &Placement, sink: &mut S) {
    for check in Check::WEEKLY {
        match check {
            Check::Overplaced => overplaced(snap, p, sink),
            Check::TeacherPerWeek => teacher_per_week(snap, p, sink),
            Check::SubjectDistribution => subject_distribution(snap, p, sink),
            _ => unreachable!("daily check in weekly scan"),
        }
    }
}

fn conflicts<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    #[derive(Clone, Copy)]
    enum Res {
        Teacher,
        Class,
        Room,
    }
    for period in 1..=view.periods {
        let here = &view.at[period as usize];
        if here.len() < 2 {
            continue;
        }
        let cell = view.cell(period);
        for res in [Res::Teacher, Res::Class, Res::Room] {
            // entity -> units holding it in this cell
            let mut held: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for &u in here {
                let info = &snap.komas[p.unit(u).koma];
                let ents = match res {
                    Res::Teacher => &info.teachers,
                    Res::Class => &info.classes,
                    Res::Room => &info.rooms,
                };
                for &e in ents {
                    held.entry(e).or_default().push(u);
                }
            }
            for (e, units) in held {
                if units.len() < 2 || units.iter().all(|&u| !p.is_movable(u)) {
                    continue;
                }
                let culprit = units
                    .iter()
                    .copied()
                    .find(|&u| p.is_movable(u))
                    .map(|u| p.unit(u).koma);
                let (kind, name, scope) = match res {
                    Res::Teacher => (
                        ViolationKind::TeacherConflict,
                        snap.teachers[e].name.as_str(),
                        Scope::Teacher(e),
                    ),
                    Res::Class => (ViolationKind::ClassConflict, snap.class_label(e), Scope::Class(e)),
                    Res::Room => (ViolationKind::RoomConflict, snap.rooms[e].name.as_str(), Scope::Room(e)),
                };
                sink.hit(kind, HARD, At::cell(cell, culprit).scoped(scope), || {
                    let lessons: Vec<String> =
                        units.iter().map(|&u| snap.koma_label(p.unit(u).koma)).collect();
                    format!("{} is double-booked at {}: {}", name, cell, lessons.join(", "))
                });
            }
        }
    }
}

fn availability<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    for &(u, start) in &view.units {
        let unit = p.unit(u);
        if unit.fixed {
            continue;
        }
        let info = &snap.komas[unit.koma];
        for off in 0..unit.len {
            let cell = Cell::new(view.day, start.period + off);
            if !snap.contains(cell) {
                continue;
            }
            let i = snap.index(cell);
            for &t in &info.teachers {
                let teacher = &snap.teachers[t];
                if teacher.on_duty[i] {
                    sink.hit(ViolationKind::DutyConflict, HARD, At::cell(cell, Some(unit.koma)), || {
                        format!("{} is on duty at {}", teacher.name, cell)
                    });
                } else if teacher.unavailable[i] {
                    sink.hit(
                        ViolationKind::TeacherUnavailable,
                        HARD,
                        At::cell(cell, Some(unit.koma)),
                        || format!("{} is unavailable at {}", teacher.name, cell),
                    );
                }
            }
            for &r in &info.rooms {
                let room = &snap.rooms[r];
                if room.unavailable[i] {
                    sink.hit(ViolationKind::RoomUnavailable, HARD, At::cell(cell, Some(unit.koma)), || {
                        format!("room {} is unavailable at {}", room.name, cell)
                    });
                }
            }
        }
    }
}

fn consecutive<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    // koma -> (period, movable) for consecutive komas on this day
    let mut by_koma: BTreeMap<usize, Vec<(u8, bool)>> = BTreeMap::new();
    for &(u, start) in &view.units {
        let unit = p.unit(u);
        if !snap.komas[unit.koma].consecutive {
            continue;
        }
        let list = by_koma.entry(unit.koma).or_default();
        for off in 0..unit.len {
            list.push((start.period + off, !unit.fixed));
        }
    }
    for (k, mut periods) in by_koma {
        periods.sort_unstable();
        periods.dedup_by_key(|x| x.0);
        let len = snap.komas[k].block_len.max(1) as usize;
        let mut i = 0;
        while i < periods.len() {
            let mut j = i + 1;
            while j < periods.len() && periods[j].0 == periods[j - 1].0 + 1 {
                j += 1;
            }
            let run = &periods[i..j];
            if run.len() % len != 0 && run.iter().any(|x| x.1) {
                let cell = view.cell(run[0].0);
                sink.hit(ViolationKind::ConsecutiveBroken, HARD, At::cell(cell, Some(k)), || {
                    format!(
                        "{} needs blocks of {} adjacent periods but has a run of {} at {}",
                        snap.koma_label(k),
                        len,
                        run.len(),
                        cell
                    )
                });
            }
            i = j;
        }
    }
}

fn subject_per_day<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    let cond = &snap.condition.subject_max_per_day;
    // (class, subject) -> (lessons, first koma)
    let mut lessons: BTreeMap<(usize, usize), (u32, usize)> = BTreeMap::new();
    for &(u, _) in &view.units {
        let k = p.unit(u).koma;
        let info = &snap.komas[k];
        for &c in &info.classes {
            let e = lessons.entry((c, info.subject)).or_insert((0, k));
            e.0 += 1;
        }
    }
    for ((c, s), (n, k)) in lessons {
        let subject = &snap.subjects[s];
        if n <= subject.max_per_day as u32 {
            continue;
        }
        let Some(g) = grade(snap.subject_level(s, cond.level), cond.weight) else {
            continue;
        };
        let at = At::day(view.day, Some(k)).scoped(Scope::ClassSubject { class: c, subject: s });
        sink.hit(ViolationKind::SubjectMaxPerDay, g, at, || {
            format!(
                "{} has {} {} lessons on day {} (max {})",
                snap.class_label(c),
                n,
                subject.name,
                view.day,
                subject.max_per_day
            )
        });
    }
}

fn breaks_restriction(snap: &Snapshot, r: PlacementRestriction, day: u8, first: u8, last: u8) -> bool {
    let morning = snap.school.morning_periods;
    match r {
        PlacementRestriction::None => false,
        PlacementRestriction::NoFirstPeriod => first == 1,
        PlacementRestriction::NoLastPeriod => last == snap.periods_on(day),
        PlacementRestriction::NoFirstOrLastPeriod => first == 1 || last == snap.periods_on(day),
        PlacementRestriction::MorningOnly => last > morning,
        PlacementRestriction::AfternoonOnly => first <= morning,
    }
}

fn restriction<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    let cond = &snap.condition.placement_restriction;
    for &(u, start) in &view.units {
        let unit = p.unit(u);
        if unit.fixed {
            continue;
        }
        let info = &snap.komas[unit.koma];
        let subject = &snap.subjects[info.subject];
        let last = start.period + unit.len - 1;
        if !breaks_restriction(snap, subject.restriction, view.day, start.period, last) {
            continue;
        }
        let Some(g) = grade(snap.subject_level(info.subject, cond.level), cond.weight) else {
            continue;
        };
        sink.hit(ViolationKind::PlacementRestriction, g, At::cell(start, Some(unit.koma)), || {
            format!(
                "{} placed at {} breaks its {:?} restriction",
                snap.koma_label(unit.koma),
                start,
                subject.restriction
            )
        });
    }
}

/// Teachers with at least one lesson on the day, ascending.
fn teachers_on(snap: &Snapshot, p: &Placement, view: &DayView) -> Vec<usize> {
    let mut out: Vec<usize> = view
        .units
        .iter()
        .flat_map(|&(u, _)| snap.komas[p.unit(u).koma].teachers.iter().copied())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn teacher_per_day<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    let cond = &snap.condition.teacher_max_per_day;
    let Some(g) = grade(cond.level, cond.weight) else {
        return;
    };
    for t in teachers_on(snap, p, view) {
        let teacher = &snap.teachers[t];
        let Some(max) = teacher.max_per_day else {
            continue;
        };
        let n = (1..=view.periods)
            .filter(|&per| p.teacher_at(snap, t, view.cell(per)) > 0)
            .count();
        if n > max as usize {
            let at = At::day(view.day, None).scoped(Scope::Teacher(t));
            sink.hit(ViolationKind::TeacherMaxPerDay, g, at, || {
                format!("{} teaches {} periods on day {} (max {})", teacher.name, n, view.day, max)
            });
        }
    }
}

fn teacher_consecutive<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    let cond = &snap.condition.teacher_max_consecutive;
    let Some(g) = grade(cond.level, cond.weight) else {
        return;
    };
    for t in teachers_on(snap, p, view) {
        let teacher = &snap.teachers[t];
        let Some(max) = teacher.max_consecutive else {
            continue;
        };
        let mut run = 0u8;
        for per in 1..=view.periods + 1 {
            let busy = per <= view.periods && p.teacher_at(snap, t, view.cell(per)) > 0;
            if busy {
                run += 1;
                continue;
            }
            if run > max {
                let start = view.cell(per - run);
                let at = At::cell(start, None).scoped(Scope::Teacher(t));
                sink.hit(ViolationKind::TeacherMaxConsecutive, g, at, || {
                    format!(
                        "{} teaches {} periods in a row from {} (max {})",
                        teacher.name, run, start, max
                    )
                });
            }
            run = 0;
        }
    }
}

fn teacher_preference<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    let cond = &snap.condition.teacher_preference;
    let Some(g) = grade(cond.level, cond.weight) else {
        return;
    };
    for &(u, start) in &view.units {
        let unit = p.unit(u);
        if unit.fixed {
            continue;
        }
        for &t in &snap.komas[unit.koma].main_teachers {
            let teacher = &snap.teachers[t];
            if !teacher.has_preferences {
                continue;
            }
            let outside = (0..unit.len).any(|off| {
                let cell = Cell::new(view.day, start.period + off);
                snap.contains(cell) && !teacher.preferred[snap.index(cell)]
            });
            if outside {
                sink.hit(ViolationKind::TeacherPreference, g, At::cell(start, Some(unit.koma)), || {
                    format!("{} prefers not to teach at {}", teacher.name, start)
                });
            }
        }
    }
}

fn class_gaps<S: Sink>(snap: &Snapshot, p: &Placement, view: &DayView, sink: &mut S) {
    let cond = &snap.condition.class_gaps;
    let Some(g) = grade(cond.level, cond.weight) else {
        return;
    };
    let mut classes: Vec<usize> = view
        .units
        .iter()
        .flat_map(|&(u, _)| snap.komas[p.unit(u).koma].classes.iter().copied())
        .collect();
    classes.sort_unstable();
    classes.dedup();
    for c in classes {
        let busy: Vec<u8> = (1..=view.periods)
            .filter(|&per| p.class_at(snap, c, view.cell(per)) > 0)
            .collect();
        let (Some(&first), Some(&last)) = (busy.first(), busy.last()) else {
            continue;
        };
        for per in first..=last {
            if busy.binary_search(&per).is_ok() {
                continue;
            }
            let cell = view.cell(per);
            sink.hit(ViolationKind::ClassGaps, g, At::cell(cell, None).scoped(Scope::Class(c)), || {
                format!("{} has a free period at {}", snap.class_label(c), cell)
            });
        }
    }
}

fn overplaced<S: Sink>(snap: &Snapshot, p: &Placement, sink: &mut S) {
    let mut placed = vec![0u32; snap.komas.len()];
    for (u, _) in p.placed() {
        placed[p.unit(u).koma] += p.unit(u).len as u32;
    }
    for (k, n) in placed.into_iter().enumerate() {
        let count = snap.komas[k].count as u32;
        if n > count {
            sink.hit(ViolationKind::Overplaced, HARD, At::week(Scope::Koma(k)), || {
                format!("{} is placed {} times but needs {}", snap.koma_label(k), n, count)
            });
        }
    }
}

fn teacher_per_week<S: Sink>(snap: &Snapshot, p: &Placement, sink: &mut S) {
    let cond = &snap.condition.teacher_max_per_week;
    let Some(g) = grade(cond.level, cond.weight) else {
        return;
    };
    let mut load = vec![0u32; snap.teachers.len()];
    for (u, _) in p.placed() {
        let unit = p.unit(u);
        for &t in &snap.komas[unit.koma].teachers {
            load[t] += unit.len as u32;
        }
    }
    for (t, n) in load.into_iter().enumerate() {
        let teacher = &snap.teachers[t];
        let Some(max) = teacher.max_per_week else {
            continue;
        };
        if n > max as u32 {
            sink.hit(ViolationKind::TeacherMaxPerWeek, g, At::week(Scope::Teacher(t)), || {
                format!("{} teaches {} periods this week (max {})", teacher.name, n, max)
            });
        }
    }
}

fn subject_distribution<S: Sink>(snap: &Snapshot, p: &Placement, sink: &mut S) {
    let cond = &snap.condition.subject_distribution;
    // load balance is never a hard constraint
    let level = match cond.level {
        ConstraintLevel::Forbidden => ConstraintLevel::Consider,
        l => l,
    };
    let Some(g) = grade(level, cond.weight) else {
        return;
    };
    let days = snap.days as usize;
    let mut per_day: BTreeMap<(usize, usize), [u16; 7]> = BTreeMap::new();
    for (u, cell) in p.placed() {
        let info = &snap.komas[p.unit(u).koma];
        for &c in &info.classes {
            per_day.entry((c, info.subject)).or_insert([0; 7])[cell.day_of_week as usize] += 1;
        }
    }
    for ((c, s), counts) in per_day {
        let counts = &counts[..days];
        let total: u16 = counts.iter().sum();
        let max = counts.iter().copied().max().unwrap_or(0);
        let min = counts.iter().copied().min().unwrap_or(0);
        if total >= 2 && max - min > 1 {
            let at = At::week(Scope::ClassSubject { class: c, subject: s });
            sink.hit(ViolationKind::SubjectDistribution, g, at, || {
                format!(
                    "{} lessons of {} are unevenly spread over the week ({:?})",
                    snap.subjects[s].name,
                    snap.class_label(c),
                    counts
                )
            });
        }
    }
}
