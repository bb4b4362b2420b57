//! Shared input fixtures for the timetable crates.
//!
//! Add as a dev-dependency and build inputs with [`InputBuilder`]; any
//! teacher, class, subject or room a koma references is registered on the
//! fly.

use types::{
    Availability, AvailabilityStatus, ClassInfo, GradeId, Koma, KomaTeacher, KomaType, PlacedBy,
    Room, ScheduleCondition, School, SolverConfig, SolverInput, Subject, Teacher, TeacherRole,
    TimetableSlot,
};

pub struct InputBuilder {
    input: SolverInput,
}

impl InputBuilder {
    pub fn new(days: u8, periods: u8) -> Self {
        Self {
            input: SolverInput {
                school: School {
                    id: "school".into(),
                    name: "Test School".into(),
                    days_per_week: days,
                    max_periods_per_day: periods,
                    periods_per_day: Vec::new(),
                    morning_periods: 4,
                },
                classes: Vec::new(),
                teachers: Vec::new(),
                subjects: Vec::new(),
                rooms: Vec::new(),
                duties: Vec::new(),
                komas: Vec::new(),
                condition: ScheduleCondition::default(),
                fixed_slots: Vec::new(),
            },
        }
    }

    pub fn teacher(mut self, id: &str) -> Self {
        self.ensure_teacher(id);
        self
    }

    pub fn room(mut self, id: &str) -> Self {
        self.ensure_room(id);
        self
    }

    pub fn koma(self, id: &str, subject: &str, teachers: &[&str], classes: &[&str], count: u8) -> Self {
        self.koma_with(koma(id, subject, teachers, classes, count))
    }

    pub fn consecutive_koma(
        self,
        id: &str,
        subject: &str,
        teachers: &[&str],
        classes: &[&str],
        count: u8,
    ) -> Self {
        let mut k = koma(id, subject, teachers, classes, count);
        k.r#type = KomaType::Consecutive;
        self.koma_with(k)
    }

    pub fn koma_with(mut self, k: Koma) -> Self {
        if !self.input.subjects.iter().any(|s| s.id == k.subject_id) {
            self.input.subjects.push(Subject {
                id: k.subject_id.clone(),
                name: String::new(),
            });
        }
        for t in &k.teachers {
            self.ensure_teacher(&t.teacher_id.0);
        }
        for c in &k.class_ids {
            if !self.input.classes.iter().any(|x| &x.id == c) {
                self.input.classes.push(ClassInfo {
                    id: c.clone(),
                    grade_id: k.grade_id.clone(),
                    name: String::new(),
                });
            }
        }
        for r in &k.room_ids {
            self.ensure_room(&r.0);
        }
        self.input.komas.push(k);
        self
    }

    /// Marks every cell of `teacher` unavailable except the listed ones.
    pub fn only_available(mut self, teacher: &str, cells: &[(u8, u8)]) -> Self {
        self.ensure_teacher(teacher);
        let school = self.input.school.clone();
        let t = self
            .input
            .teachers
            .iter_mut()
            .find(|t| t.id.0 == teacher)
            .expect("teacher registered above");
        for d in 0..school.days_per_week {
            for p in 1..=school.periods_on(d) {
                if !cells.contains(&(d, p)) {
                    t.availability.push(Availability {
                        day_of_week: d,
                        period: p,
                        status: AvailabilityStatus::Unavailable,
                    });
                }
            }
        }
        self
    }

    /// Marks the listed cells of `room` unavailable.
    pub fn room_unavailable(mut self, room: &str, cells: &[(u8, u8)]) -> Self {
        self.ensure_room(room);
        if let Some(r) = self.input.rooms.iter_mut().find(|r| r.id.0 == room) {
            r.availability.extend(cells.iter().map(|&(d, p)| Availability {
                day_of_week: d,
                period: p,
                status: AvailabilityStatus::Unavailable,
            }));
        }
        self
    }

    /// Marks the listed cells of `teacher` preferred.
    pub fn prefers(mut self, teacher: &str, cells: &[(u8, u8)]) -> Self {
        self.ensure_teacher(teacher);
        if let Some(t) = self.input.teachers.iter_mut().find(|t| t.id.0 == teacher) {
            t.availability.extend(cells.iter().map(|&(d, p)| Availability {
                day_of_week: d,
                period: p,
                status: AvailabilityStatus::Preferred,
            }));
        }
        self
    }

    pub fn fixed(mut self, koma: &str, day: u8, period: u8) -> Self {
        let n = self.input.fixed_slots.len();
        let mut s = slot(&format!("fixed-{n}"), koma, day, period);
        s.is_fixed = true;
        s.placed_by = PlacedBy::Fixed;
        self.input.fixed_slots.push(s);
        self
    }

    pub fn condition(mut self, condition: ScheduleCondition) -> Self {
        self.input.condition = condition;
        self
    }

    pub fn build(self) -> SolverInput {
        self.input
    }

    fn ensure_teacher(&mut self, id: &str) {
        if !self.input.teachers.iter().any(|t| t.id.0 == id) {
            self.input.teachers.push(Teacher {
                id: id.into(),
                name: String::new(),
                max_per_day: None,
                max_consecutive: None,
                max_periods_per_week: None,
                availability: Vec::new(),
            });
        }
    }

    fn ensure_room(&mut self, id: &str) {
        if !self.input.rooms.iter().any(|r| r.id.0 == id) {
            self.input.rooms.push(Room {
                id: id.into(),
                name: String::new(),
                availability: Vec::new(),
            });
        }
    }
}

pub fn koma(id: &str, subject: &str, teachers: &[&str], classes: &[&str], count: u8) -> Koma {
    Koma {
        id: id.into(),
        subject_id: subject.into(),
        grade_id: GradeId("g1".into()),
        count,
        r#type: KomaType::Normal,
        priority: 0,
        teachers: teachers
            .iter()
            .map(|t| KomaTeacher {
                teacher_id: (*t).into(),
                role: TeacherRole::Main,
            })
            .collect(),
        class_ids: classes.iter().map(|c| (*c).into()).collect(),
        room_ids: Vec::new(),
        block_length: None,
    }
}

/// A koma held in the given rooms.
pub fn room_koma(id: &str, subject: &str, teachers: &[&str], classes: &[&str], rooms: &[&str], count: u8) -> Koma {
    let mut k = koma(id, subject, teachers, classes, count);
    k.room_ids = rooms.iter().map(|r| (*r).into()).collect();
    k
}

pub fn slot(id: &str, koma: &str, day: u8, period: u8) -> TimetableSlot {
    TimetableSlot {
        id: id.into(),
        pattern_id: "p0".into(),
        koma_id: koma.into(),
        day_of_week: day,
        period,
        placed_by: PlacedBy::Manual,
        is_fixed: false,
    }
}

/// Short-budget config for unit tests.
pub fn quick_config(restarts: u8) -> SolverConfig {
    SolverConfig {
        max_time_ms: 10_000,
        max_patterns: 1,
        ils_restarts: restarts,
        seed: 7,
    }
}

/// A school-sized instance: `classes` classes sharing a pool of teachers,
/// each class taking the same six subjects.
pub fn school_week(classes: usize, teachers: usize) -> SolverInput {
    let subjects: [(&str, u8); 6] = [
        ("jpn", 5),
        ("math", 5),
        ("eng", 4),
        ("sci", 4),
        ("soc", 3),
        ("pe", 3),
    ];
    let mut b = InputBuilder::new(5, 6);
    let mut n = 0usize;
    for c in 0..classes {
        let class = format!("c{c}");
        for (s, count) in subjects {
            let teacher = format!("t{}", n % teachers.max(1));
            n += 1;
            let mut k = koma(&format!("{class}-{s}"), s, &[&teacher], &[&class], count);
            k.priority = (count % 3) as u8;
            b = b.koma_with(k);
        }
    }
    b.build()
}
