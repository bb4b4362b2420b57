use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Clone,
            Debug,
            Serialize,
            Deserialize,
            ToSchema,
            JsonSchema,
            Eq,
            PartialEq,
            Hash,
            PartialOrd,
            Ord,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}
id_newtype!(SchoolId);
id_newtype!(KomaId);
id_newtype!(SubjectId);
id_newtype!(GradeId);
id_newtype!(TeacherId);
id_newtype!(ClassId);
id_newtype!(RoomId);
id_newtype!(DutyId);
id_newtype!(SlotId);
id_newtype!(PatternId);

/// One `(dayOfWeek, period)` cell of the weekly grid. Days are 0-based,
/// periods 1-based.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub day_of_week: u8,
    pub period: u8,
}

impl Cell {
    pub fn new(day_of_week: u8, period: u8) -> Self {
        Self {
            day_of_week,
            period,
        }
    }
}

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DAY_NAMES.get(self.day_of_week as usize) {
            Some(d) => write!(f, "{} {}", d, self.period),
            None => write!(f, "day{} {}", self.day_of_week, self.period),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: SchoolId,
    #[serde(default)]
    pub name: String,
    pub days_per_week: u8,
    pub max_periods_per_day: u8,
    /// Per-day period counts; days beyond the list use `max_periods_per_day`.
    #[serde(default)]
    pub periods_per_day: Vec<u8>,
    #[serde(default = "default_morning_periods")]
    pub morning_periods: u8,
}

fn default_morning_periods() -> u8 {
    4
}

impl School {
    pub fn periods_on(&self, day: u8) -> u8 {
        self.periods_per_day
            .get(day as usize)
            .copied()
            .unwrap_or(self.max_periods_per_day)
            .min(self.max_periods_per_day)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: ClassId,
    pub grade_id: GradeId,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
    Preferred,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub day_of_week: u8,
    pub period: u8,
    pub status: AvailabilityStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub max_per_day: Option<u8>,
    #[serde(default)]
    pub max_consecutive: Option<u8>,
    #[serde(default)]
    pub max_periods_per_week: Option<u16>,
    #[serde(default)]
    pub availability: Vec<Availability>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub availability: Vec<Availability>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Duty {
    pub id: DutyId,
    #[serde(default)]
    pub name: String,
    pub day_of_week: u8,
    pub period: u8,
    #[serde(default)]
    pub teacher_ids: Vec<TeacherId>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum KomaType {
    #[default]
    Normal,
    Consecutive,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TeacherRole {
    #[default]
    Main,
    Sub,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KomaTeacher {
    pub teacher_id: TeacherId,
    #[serde(default)]
    pub role: TeacherRole,
}

pub const DEFAULT_BLOCK_LENGTH: u8 = 2;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Koma {
    pub id: KomaId,
    pub subject_id: SubjectId,
    pub grade_id: GradeId,
    pub count: u8,
    #[serde(default)]
    pub r#type: KomaType,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub teachers: Vec<KomaTeacher>,
    #[serde(default)]
    pub class_ids: Vec<ClassId>,
    #[serde(default)]
    pub room_ids: Vec<RoomId>,
    /// Periods per occurrence of a `consecutive` koma.
    #[serde(default)]
    pub block_length: Option<u8>,
}

impl Koma {
    pub fn block_len(&self) -> u8 {
        match self.r#type {
            KomaType::Normal => 1,
            KomaType::Consecutive => self.block_length.unwrap_or(DEFAULT_BLOCK_LENGTH),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintLevel {
    Forbidden,
    Consider,
    Ignore,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionEntry {
    pub level: ConstraintLevel,
    #[serde(default)]
    pub weight: u32,
}

impl ConditionEntry {
    pub const fn consider(weight: u32) -> Self {
        Self {
            level: ConstraintLevel::Consider,
            weight,
        }
    }

    pub const fn forbidden() -> Self {
        Self {
            level: ConstraintLevel::Forbidden,
            weight: 0,
        }
    }

    pub const fn ignore() -> Self {
        Self {
            level: ConstraintLevel::Ignore,
            weight: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum PlacementRestriction {
    #[default]
    None,
    NoFirstPeriod,
    NoLastPeriod,
    NoFirstOrLastPeriod,
    MorningOnly,
    AfternoonOnly,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerSubjectCondition {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub placement_restriction: PlacementRestriction,
    #[serde(default)]
    pub max_per_day: Option<u8>,
    /// Overrides the global level of the subject checks for this subject.
    #[serde(default)]
    pub level: Option<ConstraintLevel>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleCondition {
    pub teacher_max_per_day: ConditionEntry,
    pub teacher_max_consecutive: ConditionEntry,
    pub teacher_max_per_week: ConditionEntry,
    pub teacher_preference: ConditionEntry,
    pub subject_max_per_day: ConditionEntry,
    pub placement_restriction: ConditionEntry,
    pub subject_distribution: ConditionEntry,
    pub class_gaps: ConditionEntry,
    pub default_subject_max_per_day: u8,
    pub per_subject: Vec<PerSubjectCondition>,
}

impl Default for ScheduleCondition {
    fn default() -> Self {
        Self {
            teacher_max_per_day: ConditionEntry::consider(10),
            teacher_max_consecutive: ConditionEntry::consider(10),
            teacher_max_per_week: ConditionEntry::consider(20),
            teacher_preference: ConditionEntry::ignore(),
            subject_max_per_day: ConditionEntry::consider(30),
            placement_restriction: ConditionEntry::consider(30),
            subject_distribution: ConditionEntry::consider(5),
            class_gaps: ConditionEntry::consider(3),
            default_subject_max_per_day: 1,
            per_subject: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PlacedBy {
    #[default]
    Auto,
    Manual,
    Fixed,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSlot {
    pub id: SlotId,
    pub pattern_id: PatternId,
    pub koma_id: KomaId,
    pub day_of_week: u8,
    pub period: u8,
    #[serde(default)]
    pub placed_by: PlacedBy,
    #[serde(default)]
    pub is_fixed: bool,
}

impl TimetableSlot {
    pub fn cell(&self) -> Cell {
        Cell::new(self.day_of_week, self.period)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    TeacherConflict,
    ClassConflict,
    RoomConflict,
    TeacherUnavailable,
    RoomUnavailable,
    DutyConflict,
    Overplaced,
    ConsecutiveBroken,
    SubjectMaxPerDay,
    PlacementRestriction,
    SubjectDistribution,
    TeacherMaxPerDay,
    TeacherMaxConsecutive,
    TeacherMaxPerWeek,
    TeacherPreference,
    ClassGaps,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub r#type: ViolationKind,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub koma_id: Option<KomaId>,
}

impl Violation {
    /// Identity used to match a violation across two evaluations.
    pub fn key(&self) -> (ViolationKind, Option<u8>, Option<u8>, Option<&KomaId>, &str) {
        (
            self.r#type,
            self.day_of_week,
            self.period,
            self.koma_id.as_ref(),
            self.message.as_str(),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub koma_id: KomaId,
    pub required: u8,
    pub placed: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolverResult {
    pub pattern_id: PatternId,
    pub assignments: Vec<TimetableSlot>,
    pub violations: Vec<Violation>,
    pub shortfalls: Vec<Shortfall>,
    pub score: i64,
    pub is_complete: bool,
    pub elapsed_ms: u64,
    pub stats: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolverInput {
    pub school: School,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub duties: Vec<Duty>,
    #[serde(default)]
    pub komas: Vec<Koma>,
    #[serde(default)]
    pub condition: ScheduleCondition,
    #[serde(default)]
    pub fixed_slots: Vec<TimetableSlot>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolverConfig {
    pub max_time_ms: u64,
    pub max_patterns: u8,
    pub ils_restarts: u8,
    #[serde(default)]
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_time_ms: 60_000,
            max_patterns: 1,
            ils_restarts: 5,
            seed: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Construct,
    Optimize,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Construct => "construct",
            Phase::Optimize => "optimize",
            Phase::Done => "done",
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolverProgress {
    pub phase_label: Phase,
    pub placed_count: u32,
    pub total_komas: u32,
    pub pattern_index: u8,
    pub total_patterns: u8,
    pub score: i64,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SolverMessage {
    Progress(SolverProgress),
    Result { patterns: Vec<SolverResult> },
    Error { message: String },
}

/// Atomic, reversible relocation of one placed occurrence.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotMove {
    pub koma_id: KomaId,
    pub slot_ids: Vec<SlotId>,
    pub length: u8,
    pub from: Cell,
    pub to: Cell,
}

impl SlotMove {
    pub fn inverse(&self) -> SlotMove {
        SlotMove {
            koma_id: self.koma_id.clone(),
            slot_ids: self.slot_ids.clone(),
            length: self.length,
            from: self.to,
            to: self.from,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwapProposal {
    pub moves: Vec<SlotMove>,
    pub score_delta: i64,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoFixSuggestion {
    pub target: Violation,
    pub r#move: SlotMove,
    pub removed_violations: Vec<Violation>,
    pub new_violations: Vec<Violation>,
    pub score_delta: i64,
    pub description: String,
}
