use chrono::{Datelike, Days, Duration, NaiveDate, NaiveTime, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

mod interval;
pub mod schema;

pub use interval::{IntervalError, TimeInterval};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Clone,
            Debug,
            Serialize,
            Deserialize,
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
                Self(s.to_owned())
            }
        }
    };
}
id_newtype!(SessionId);
id_newtype!(CourseId);
id_newtype!(TeacherId);
id_newtype!(StudentId);
id_newtype!(RoomId);

#[derive(
    Clone, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Equip {
    Projector,
    Computers,
    InteractiveBoard,
    Internet,
    Whiteboard,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Lecture,
    Tutorial,
    Lab,
}

/// Room layout; `None` on a room means it can host any kind of session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Amphi,
    Td,
    Labo,
    Meeting,
}

impl RoomKind {
    pub fn hosts(self, kind: SessionKind) -> bool {
        match self {
            RoomKind::Amphi => kind == SessionKind::Lecture,
            RoomKind::Td => matches!(kind, SessionKind::Lecture | SessionKind::Tutorial),
            RoomKind::Labo => kind == SessionKind::Lab,
            RoomKind::Meeting => false,
        }
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<Weekday> for DayOfWeek {
    fn from(d: Weekday) -> Self {
        match d {
            Weekday::Mon => DayOfWeek::Mon,
            Weekday::Tue => DayOfWeek::Tue,
            Weekday::Wed => DayOfWeek::Wed,
            Weekday::Thu => DayOfWeek::Thu,
            Weekday::Fri => DayOfWeek::Fri,
            Weekday::Sat => DayOfWeek::Sat,
            Weekday::Sun => DayOfWeek::Sun,
        }
    }
}

/// Recurring daily time window, optionally limited to some weekdays.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct WeeklyWindow {
    /// Empty means every day.
    #[serde(default)]
    pub days: BTreeSet<DayOfWeek>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WeeklyWindow {
    pub fn daily(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            days: BTreeSet::new(),
            start,
            end,
        }
    }

    fn applies_to(&self, date: NaiveDate) -> bool {
        self.days.is_empty() || self.days.contains(&DayOfWeek::from(date.weekday()))
    }

    /// Whether `interval` lies entirely inside the window on one day.
    pub fn contains(&self, interval: &TimeInterval) -> bool {
        let (start, end) = (interval.start(), interval.end());
        start.date() == end.date()
            && self.applies_to(start.date())
            && self.start <= start.time()
            && end.time() <= self.end
    }

    /// Whether `interval` shares any time with the window.
    pub fn overlaps(&self, interval: &TimeInterval) -> bool {
        let mut date = interval.start().date();
        while date <= interval.end().date() {
            let from = date.and_time(self.start);
            let to = date.and_time(self.end);
            if self.applies_to(date) && from < interval.end() && interval.start() < to {
                return true;
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        false
    }
}

/// Scheduling precedence; `High` sessions are placed first.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Default, Eq, PartialEq, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Available,
    Maintenance,
    OutOfService,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct UnavailablePeriod {
    pub interval: TimeInterval,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub capacity: u32,
    #[serde(default)]
    pub equip: Vec<Equip>,
    #[serde(default)]
    pub campus: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub kind: Option<RoomKind>,
    #[serde(default)]
    pub status: RoomStatus,
    #[serde(default)]
    pub unavailable: Vec<UnavailablePeriod>,
}

impl Room {
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: RoomId(id.into()),
            capacity,
            equip: Vec::new(),
            campus: None,
            building: None,
            kind: None,
            status: RoomStatus::Available,
            unavailable: Vec::new(),
        }
    }

    pub fn is_in_service(&self) -> bool {
        self.status == RoomStatus::Available
    }

    pub fn is_unavailable_during(&self, interval: &TimeInterval) -> bool {
        self.unavailable
            .iter()
            .any(|p| p.interval.overlaps(interval))
    }
}

/// Operator-requested interval and/or room for a session.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPin {
    #[serde(default)]
    pub interval: Option<TimeInterval>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
}

impl SessionPin {
    pub fn is_empty(&self) -> bool {
        self.interval.is_none() && self.room_id.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub course_id: CourseId,
    #[serde(default)]
    pub kind: SessionKind,
    pub duration_minutes: u32,
    #[serde(default)]
    pub teacher_id: Option<TeacherId>,
    #[serde(default)]
    pub students: BTreeSet<StudentId>,
    #[serde(default)]
    pub required_capacity: u32,
    #[serde(default)]
    pub needs: Vec<Equip>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub campus: Option<String>,
    /// When non-empty, grid slots must fall inside one of these windows.
    #[serde(default)]
    pub allowed: Vec<WeeklyWindow>,
    /// Grid slots touching any of these windows are skipped.
    #[serde(default)]
    pub forbidden: Vec<WeeklyWindow>,
    #[serde(default, skip_serializing_if = "SessionPin::is_empty")]
    pub pin: SessionPin,
}

impl Session {
    pub fn new(id: impl Into<String>, course_id: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            id: SessionId(id.into()),
            course_id: CourseId(course_id.into()),
            kind: SessionKind::default(),
            duration_minutes,
            teacher_id: None,
            students: BTreeSet::new(),
            required_capacity: 0,
            needs: Vec::new(),
            priority: Priority::default(),
            campus: None,
            allowed: Vec::new(),
            forbidden: Vec::new(),
            pin: SessionPin::default(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Whether the session's time windows admit `interval`.
    pub fn admits(&self, interval: &TimeInterval) -> bool {
        (self.allowed.is_empty() || self.allowed.iter().any(|w| w.contains(interval)))
            && !self.forbidden.iter().any(|w| w.overlaps(interval))
    }

    /// Seats the session needs: the declared capacity, or the enrolment
    /// when more students are enrolled than declared.
    pub fn demand(&self) -> u32 {
        let enrolled = u32::try_from(self.students.len()).unwrap_or(u32::MAX);
        self.required_capacity.max(enrolled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Horizon {
    pub academic_year: String,
    pub term: String,
}

impl Horizon {
    pub fn new(academic_year: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            academic_year: academic_year.into(),
            term: term.into(),
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.academic_year, self.term)
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
pub enum ConflictKind {
    #[serde(rename = "RoomConflict")]
    Room,
    #[serde(rename = "TeacherConflict")]
    Teacher,
    #[serde(rename = "StudentConflict")]
    Student,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictKind::Room => "room",
            ConflictKind::Teacher => "teacher",
            ConflictKind::Student => "student",
        };
        f.write_str(s)
    }
}

/// Outcome of checking one placement against a committed set.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub has_conflict: bool,
    /// Sorted, no duplicates.
    pub reasons: Vec<ConflictKind>,
    /// Sessions whose placements clash with the checked one. Sorted.
    pub conflicts_with: Vec<SessionId>,
}

impl ConflictReport {
    pub fn from_parts(reasons: BTreeSet<ConflictKind>, with: BTreeSet<SessionId>) -> Self {
        Self {
            has_conflict: !reasons.is_empty(),
            reasons: reasons.into_iter().collect(),
            conflicts_with: with.into_iter().collect(),
        }
    }

    pub fn has(&self, kind: ConflictKind) -> bool {
        self.reasons.contains(&kind)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub session_id: SessionId,
    pub room_id: RoomId,
    pub interval: TimeInterval,
    #[serde(default)]
    pub has_conflict: bool,
    #[serde(default)]
    pub is_room_overloaded: bool,
    #[serde(default)]
    pub reasons: Vec<ConflictKind>,
    #[serde(default)]
    pub cancelled: bool,
    /// Set once an operator has moved the placement by hand.
    #[serde(default)]
    pub is_modified: bool,
}

impl Placement {
    pub fn candidate(session_id: SessionId, room_id: RoomId, interval: TimeInterval) -> Self {
        Self {
            session_id,
            room_id,
            interval,
            has_conflict: false,
            is_room_overloaded: false,
            reasons: Vec::new(),
            cancelled: false,
            is_modified: false,
        }
    }

    pub fn apply(&mut self, report: &ConflictReport, overloaded: bool) {
        self.has_conflict = report.has_conflict;
        self.reasons = report.reasons.clone();
        self.is_room_overloaded = overloaded;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
pub struct Timetable {
    pub horizon: Horizon,
    pub placements: Vec<Placement>,
}

impl Timetable {
    pub fn placement(&self, session_id: &SessionId) -> Option<&Placement> {
        self.placements.iter().find(|p| &p.session_id == session_id)
    }

    pub fn conflicting(&self) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(|p| p.has_conflict)
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
pub enum UnplacedReason {
    NoCapableRoom,
    NoRoomCatalog,
    ExhaustedSlotGrid,
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnplacedReason::NoCapableRoom => "no capable room",
            UnplacedReason::NoRoomCatalog => "no room catalog",
            UnplacedReason::ExhaustedSlotGrid => "exhausted slot grid",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedSession {
    pub session_id: SessionId,
    pub reason: UnplacedReason,
    pub detail: String,
}

fn default_days() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default()
}
fn default_day_end() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default()
}

/// Calendar the allocator draws candidate start times from.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotGrid {
    pub first_day: NaiveDate,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_true")]
    pub skip_weekends: bool,
    #[serde(default = "default_day_start")]
    pub day_start: NaiveTime,
    #[serde(default = "default_day_end")]
    pub day_end: NaiveTime,
    /// Step between candidate starts; defaults to the session's duration.
    #[serde(default)]
    pub granularity_minutes: Option<u32>,
}

impl SlotGrid {
    pub fn week_of(first_day: NaiveDate) -> Self {
        Self {
            first_day,
            days: default_days(),
            skip_weekends: true,
            day_start: default_day_start(),
            day_end: default_day_end(),
            granularity_minutes: None,
        }
    }

    pub fn with_granularity(mut self, minutes: u32) -> Self {
        self.granularity_minutes = Some(minutes);
        self
    }

    /// Everything wrong with the grid; empty when it can be walked safely.
    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.days == 0 || self.days > MAX_GRID_DAYS {
            errors.push(format!(
                "grid spans {} days, expected 1 to {MAX_GRID_DAYS}",
                self.days
            ));
        }
        if self.day_start >= self.day_end {
            errors.push(format!(
                "grid day starts at {} but ends at {}",
                self.day_start, self.day_end
            ));
        }
        if self.granularity_minutes == Some(0) {
            errors.push("grid granularity must be at least one minute".into());
        }
        // Weekend skipping can stretch the walk to a week per grid day.
        let walked = u64::from(self.days.min(MAX_GRID_DAYS)) * 7 + 7;
        if self.first_day.checked_add_days(Days::new(walked)).is_none() {
            errors.push(format!(
                "grid starting {} runs past the last supported date",
                self.first_day
            ));
        }
        errors
    }
}

pub const MAX_GRID_DAYS: u32 = 366;

fn default_parallel_threshold() -> usize {
    64
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocatorConfig {
    /// Commit the least-conflicting candidate when no clean one exists.
    #[serde(default = "default_true")]
    pub allow_conflicting_fallback: bool,
    /// Treat a session no room can ever host as a fatal catalog error.
    #[serde(default)]
    pub strict_capabilities: bool,
    /// Candidate count from which checks fan out over worker threads.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            allow_conflicting_fallback: true,
            strict_capabilities: false,
            parallel_threshold: default_parallel_threshold(),
            threads: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct GenerateRequest {
    pub horizon: Horizon,
    pub sessions: Vec<Session>,
    pub rooms: Vec<Room>,
    pub grid: SlotGrid,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Generated {
    pub timetable: Timetable,
    pub placed_with_conflict: Vec<SessionId>,
    pub unplaced: Vec<UnplacedSession>,
    pub stats: serde_json::Value,
}
