//! Index-resolved, read-only view of a [`SolverInput`].
//!
//! Ids are resolved to dense indices once so the hot paths work on
//! vectors instead of string maps. Per-cell flags are laid out as
//! `day * max_periods + (period - 1)`.

use std::collections::{HashMap, HashSet};

use types::{
    AvailabilityStatus, Cell, ClassInfo, ConstraintLevel, KomaId, KomaType, PlacementRestriction,
    ScheduleCondition, School, SolverInput, TeacherRole, TimetableSlot,
};

use tracing::debug;

use crate::ValidationError;

#[derive(Clone, Debug)]
pub struct KomaInfo {
    pub id: KomaId,
    pub subject: usize,
    pub teachers: Vec<usize>,
    pub main_teachers: Vec<usize>,
    pub classes: Vec<usize>,
    pub rooms: Vec<usize>,
    pub count: u8,
    pub block_len: u8,
    pub priority: u8,
    pub consecutive: bool,
}

#[derive(Clone, Debug)]
pub struct TeacherInfo {
    pub name: String,
    pub max_per_day: Option<u8>,
    pub max_consecutive: Option<u8>,
    pub max_per_week: Option<u16>,
    pub unavailable: Vec<bool>,
    pub on_duty: Vec<bool>,
    pub preferred: Vec<bool>,
    pub has_preferences: bool,
}

#[derive(Clone, Debug)]
pub struct RoomInfo {
    pub name: String,
    pub unavailable: Vec<bool>,
}

#[derive(Clone, Debug)]
pub struct SubjectInfo {
    pub name: String,
    pub max_per_day: u8,
    pub restriction: PlacementRestriction,
    pub level: Option<ConstraintLevel>,
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub school: School,
    pub days: u8,
    pub max_periods: u8,
    periods: Vec<u8>,
    pub komas: Vec<KomaInfo>,
    pub teachers: Vec<TeacherInfo>,
    pub rooms: Vec<RoomInfo>,
    pub classes: Vec<ClassInfo>,
    pub subjects: Vec<SubjectInfo>,
    pub condition: ScheduleCondition,
    pub fixed: Vec<TimetableSlot>,
    koma_index: HashMap<KomaId, usize>,
}

impl Snapshot {
    pub fn build(inp: &SolverInput) -> Result<Self, ValidationError> {
        let mut errors: Vec<String> = Vec::new();
        let school = &inp.school;

        if !(1..=7).contains(&school.days_per_week) {
            errors.push(format!(
                "daysPerWeek must be within 1..=7, got {}",
                school.days_per_week
            ));
        }
        if !(1..=12).contains(&school.max_periods_per_day) {
            errors.push(format!(
                "maxPeriodsPerDay must be within 1..=12, got {}",
                school.max_periods_per_day
            ));
        }
        if !errors.is_empty() {
            return Err(ValidationError::Msg(errors.join("; ")));
        }

        let days = school.days_per_week;
        let max_periods = school.max_periods_per_day;
        let periods: Vec<u8> = (0..days).map(|d| school.periods_on(d)).collect();
        let cells = days as usize * max_periods as usize;
        let in_grid = |day: u8, period: u8| {
            day < days && period >= 1 && period <= periods[day as usize]
        };
        let idx = |day: u8, period: u8| day as usize * max_periods as usize + (period as usize - 1);

        fn chk_unique<'a>(name: &str, ids: impl Iterator<Item = &'a str>, errors: &mut Vec<String>) {
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id) {
                    errors.push(format!("duplicate {name} id: {id}"));
                }
            }
        }
        chk_unique("class", inp.classes.iter().map(|x| x.id.0.as_str()), &mut errors);
        chk_unique("teacher", inp.teachers.iter().map(|x| x.id.0.as_str()), &mut errors);
        chk_unique("subject", inp.subjects.iter().map(|x| x.id.0.as_str()), &mut errors);
        chk_unique("room", inp.rooms.iter().map(|x| x.id.0.as_str()), &mut errors);
        chk_unique("duty", inp.duties.iter().map(|x| x.id.0.as_str()), &mut errors);
        chk_unique("koma", inp.komas.iter().map(|x| x.id.0.as_str()), &mut errors);

        let teacher_ix: HashMap<&str, usize> = inp
            .teachers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.0.as_str(), i))
            .collect();
        let class_ix: HashMap<&str, usize> = inp
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.0.as_str(), i))
            .collect();
        let subject_ix: HashMap<&str, usize> = inp
            .subjects
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.0.as_str(), i))
            .collect();
        let room_ix: HashMap<&str, usize> = inp
            .rooms
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.0.as_str(), i))
            .collect();

        let mut teachers: Vec<TeacherInfo> = Vec::with_capacity(inp.teachers.len());
        for t in &inp.teachers {
            let mut info = TeacherInfo {
                name: display_name(&t.name, &t.id.0),
                max_per_day: t.max_per_day,
                max_consecutive: t.max_consecutive,
                max_per_week: t.max_periods_per_week,
                unavailable: vec![false; cells],
                on_duty: vec![false; cells],
                preferred: vec![false; cells],
                has_preferences: false,
            };
            for a in &t.availability {
                if !in_grid(a.day_of_week, a.period) {
                    errors.push(format!(
                        "teacher {} has availability outside the grid: {}",
                        t.id,
                        Cell::new(a.day_of_week, a.period)
                    ));
                    continue;
                }
                let i = idx(a.day_of_week, a.period);
                match a.status {
                    AvailabilityStatus::Available => {}
                    AvailabilityStatus::Unavailable => info.unavailable[i] = true,
                    AvailabilityStatus::Preferred => {
                        info.preferred[i] = true;
                        info.has_preferences = true;
                    }
                }
            }
            teachers.push(info);
        }

        let mut rooms: Vec<RoomInfo> = Vec::with_capacity(inp.rooms.len());
        for r in &inp.rooms {
            let mut info = RoomInfo {
                name: display_name(&r.name, &r.id.0),
                unavailable: vec![false; cells],
            };
            for a in &r.availability {
                if !in_grid(a.day_of_week, a.period) {
                    errors.push(format!(
                        "room {} has availability outside the grid: {}",
                        r.id,
                        Cell::new(a.day_of_week, a.period)
                    ));
                    continue;
                }
                if a.status == AvailabilityStatus::Unavailable {
                    info.unavailable[idx(a.day_of_week, a.period)] = true;
                }
            }
            rooms.push(info);
        }

        for d in &inp.duties {
            if !in_grid(d.day_of_week, d.period) {
                errors.push(format!("duty {} lies outside the grid", d.id));
                continue;
            }
            for tid in &d.teacher_ids {
                match teacher_ix.get(tid.0.as_str()) {
                    Some(&ti) => teachers[ti].on_duty[idx(d.day_of_week, d.period)] = true,
                    None => errors.push(format!("duty {} references missing teacher {}", d.id, tid)),
                }
            }
        }

        let mut subjects: Vec<SubjectInfo> = inp
            .subjects
            .iter()
            .map(|s| SubjectInfo {
                name: display_name(&s.name, &s.id.0),
                max_per_day: inp.condition.default_subject_max_per_day,
                restriction: PlacementRestriction::None,
                level: None,
            })
            .collect();
        for ps in &inp.condition.per_subject {
            match subject_ix.get(ps.subject_id.0.as_str()) {
                Some(&si) => {
                    let s = &mut subjects[si];
                    if let Some(m) = ps.max_per_day {
                        s.max_per_day = m;
                    }
                    s.restriction = ps.placement_restriction;
                    s.level = ps.level;
                }
                None => errors.push(format!(
                    "per-subject condition references missing subject {}",
                    ps.subject_id
                )),
            }
        }

        let mut komas: Vec<KomaInfo> = Vec::with_capacity(inp.komas.len());
        for k in &inp.komas {
            let subject = match subject_ix.get(k.subject_id.0.as_str()) {
                Some(&s) => s,
                None => {
                    errors.push(format!(
                        "koma {} references missing subject {}",
                        k.id, k.subject_id
                    ));
                    continue;
                }
            };
            let mut info = KomaInfo {
                id: k.id.clone(),
                subject,
                teachers: Vec::new(),
                main_teachers: Vec::new(),
                classes: Vec::new(),
                rooms: Vec::new(),
                count: k.count,
                block_len: k.block_len(),
                priority: k.priority,
                consecutive: k.r#type == KomaType::Consecutive,
            };
            for link in &k.teachers {
                match teacher_ix.get(link.teacher_id.0.as_str()) {
                    Some(&t) if !info.teachers.contains(&t) => {
                        info.teachers.push(t);
                        if link.role == TeacherRole::Main {
                            info.main_teachers.push(t);
                        }
                    }
                    Some(_) => {}
                    None => errors.push(format!(
                        "koma {} references missing teacher {}",
                        k.id, link.teacher_id
                    )),
                }
            }
            for c in &k.class_ids {
                match class_ix.get(c.0.as_str()) {
                    Some(&ci) if !info.classes.contains(&ci) => info.classes.push(ci),
                    Some(_) => {}
                    None => errors.push(format!("koma {} references missing class {}", k.id, c)),
                }
            }
            for r in &k.room_ids {
                match room_ix.get(r.0.as_str()) {
                    Some(&ri) if !info.rooms.contains(&ri) => info.rooms.push(ri),
                    Some(_) => {}
                    None => errors.push(format!("koma {} references missing room {}", k.id, r)),
                }
            }
            if k.count == 0 {
                errors.push(format!("koma {} has count=0", k.id));
            }
            if k.priority > 9 {
                errors.push(format!("koma {} has priority {} above 9", k.id, k.priority));
            }
            if info.block_len == 0 || info.block_len > max_periods {
                errors.push(format!(
                    "koma {} has invalid block length {}",
                    k.id, info.block_len
                ));
            } else if k.count % info.block_len != 0 {
                errors.push(format!(
                    "koma {} count {} is not a multiple of its block length {}",
                    k.id, k.count, info.block_len
                ));
            }
            komas.push(info);
        }

        let koma_index: HashMap<KomaId, usize> = komas
            .iter()
            .enumerate()
            .map(|(i, k)| (k.id.clone(), i))
            .collect();

        let mut fixed = Vec::with_capacity(inp.fixed_slots.len());
        for s in &inp.fixed_slots {
            if !koma_index.contains_key(&s.koma_id) {
                errors.push(format!(
                    "fixed slot {} references missing koma {}",
                    s.id, s.koma_id
                ));
                continue;
            }
            if !in_grid(s.day_of_week, s.period) {
                errors.push(format!("fixed slot {} lies outside the grid", s.id));
                continue;
            }
            let mut s = s.clone();
            s.is_fixed = true;
            s.placed_by = types::PlacedBy::Fixed;
            fixed.push(s);
        }

        if !errors.is_empty() {
            debug!(count = errors.len(), "input rejected");
            return Err(ValidationError::Msg(errors.join("; ")));
        }
        debug!(komas = komas.len(), teachers = teachers.len(), cells, "snapshot built");

        Ok(Self {
            school: school.clone(),
            days,
            max_periods,
            periods,
            komas,
            teachers,
            rooms,
            classes: inp.classes.clone(),
            subjects,
            condition: inp.condition.clone(),
            fixed,
            koma_index,
        })
    }

    pub fn cells(&self) -> usize {
        self.days as usize * self.max_periods as usize
    }

    pub fn periods_on(&self, day: u8) -> u8 {
        self.periods.get(day as usize).copied().unwrap_or(0)
    }

    pub fn index(&self, cell: Cell) -> usize {
        cell.day_of_week as usize * self.max_periods as usize + (cell.period as usize - 1)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.day_of_week < self.days && cell.period >= 1 && cell.period <= self.periods_on(cell.day_of_week)
    }

    /// Whether a block of `len` periods starting at `cell` stays on the grid.
    pub fn fits_day(&self, cell: Cell, len: u8) -> bool {
        self.contains(cell) && cell.period as u16 + len as u16 - 1 <= self.periods_on(cell.day_of_week) as u16
    }

    /// All grid cells in day-major, period-minor order.
    pub fn grid(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.days).flat_map(move |d| (1..=self.periods_on(d)).map(move |p| Cell::new(d, p)))
    }

    pub fn koma_ix(&self, id: &KomaId) -> Option<usize> {
        self.koma_index.get(id).copied()
    }

    pub fn koma_label(&self, k: usize) -> String {
        let info = &self.komas[k];
        let subject = &self.subjects[info.subject].name;
        let classes: Vec<&str> = info
            .classes
            .iter()
            .map(|&c| class_name(&self.classes[c]))
            .collect();
        if classes.is_empty() {
            subject.clone()
        } else {
            format!("{}({})", subject, classes.join(","))
        }
    }

    pub fn class_label(&self, c: usize) -> &str {
        class_name(&self.classes[c])
    }

    /// Subject-level check level, honouring the per-subject override.
    pub fn subject_level(&self, subject: usize, global: ConstraintLevel) -> ConstraintLevel {
        self.subjects[subject].level.unwrap_or(global)
    }
}

fn class_name(c: &ClassInfo) -> &str {
    if c.name.is_empty() {
        c.id.0.as_str()
    } else {
        c.name.as_str()
    }
}

fn display_name(name: &str, id: &str) -> String {
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::InputBuilder;
    use types::{Availability, Duty};

    #[test]
    fn builds_index_for_simple_input() {
        let inp = InputBuilder::new(5, 6)
            .koma("k1", "math", &["t1"], &["1A"], 3)
            .koma("k2", "eng", &["t2"], &["1A"], 2)
            .build();
        let snap = Snapshot::build(&inp).unwrap();
        assert_eq!(snap.cells(), 30);
        assert_eq!(snap.komas.len(), 2);
        assert_eq!(snap.koma_ix(&"k2".into()), Some(1));
        assert_eq!(snap.grid().count(), 30);
        assert_eq!(snap.koma_label(0), "math(1A)");
    }

    #[test]
    fn reports_all_broken_references_at_once() {
        let mut inp = InputBuilder::new(5, 6)
            .koma("k1", "math", &["t1"], &["1A"], 3)
            .build();
        inp.komas[0].teachers[0].teacher_id = "ghost".into();
        inp.komas[0].subject_id = "nope".into();
        inp.komas.push(inp.komas[0].clone());
        inp.komas[1].subject_id = "math".into();
        let err = Snapshot::build(&inp).unwrap_err().to_string();
        assert!(err.contains("missing subject nope"), "{err}");
        assert!(err.contains("duplicate koma id: k1"), "{err}");
        assert!(err.contains("missing teacher ghost"), "{err}");
    }

    #[test]
    fn consecutive_count_must_fill_whole_blocks() {
        let inp = InputBuilder::new(5, 6)
            .consecutive_koma("lab", "sci", &["t1"], &["1A"], 3)
            .build();
        let err = Snapshot::build(&inp).unwrap_err().to_string();
        assert!(err.contains("not a multiple"), "{err}");
    }

    #[test]
    fn duties_and_availability_land_on_the_grid() {
        let mut inp = InputBuilder::new(5, 6)
            .koma("k1", "math", &["t1"], &["1A"], 1)
            .build();
        inp.teachers[0].availability.push(Availability {
            day_of_week: 1,
            period: 2,
            status: AvailabilityStatus::Unavailable,
        });
        inp.duties.push(Duty {
            id: "d1".into(),
            name: "gate".into(),
            day_of_week: 0,
            period: 1,
            teacher_ids: vec!["t1".into()],
        });
        let snap = Snapshot::build(&inp).unwrap();
        let t = &snap.teachers[0];
        assert!(t.unavailable[snap.index(Cell::new(1, 2))]);
        assert!(t.on_duty[snap.index(Cell::new(0, 1))]);
        assert!(!t.has_preferences);
    }

    #[test]
    fn short_days_limit_blocks() {
        let mut inp = InputBuilder::new(6, 6).build();
        inp.school.periods_per_day = vec![6, 6, 6, 6, 6, 4];
        let snap = Snapshot::build(&inp).unwrap();
        assert!(snap.fits_day(Cell::new(5, 3), 2));
        assert!(!snap.fits_day(Cell::new(5, 4), 2));
        assert!(!snap.contains(Cell::new(5, 5)));
        assert_eq!(snap.grid().count(), 34);
    }
}
