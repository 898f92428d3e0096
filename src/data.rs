use serde::{Deserialize, Serialize};
use std::fmt;

// Type aliases for clarity
pub type AssignmentId = u32;
pub type CourseId = u32;
pub type ProfessorId = u32;
pub type DepartmentId = u32;
pub type RoomId = u32;
pub type SectionId = u32;
pub type SchoolYearId = u32;
/// Hour of the day on a 0..=24 clock.
pub type Hour = u8;

/// Teaching days of the week, Monday=1 through Saturday=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Day {
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
}

impl Day {
    pub const ALL: [Day; 6] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Day> {
        Day::ALL.get(usize::from(index).checked_sub(1)?).copied()
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Semester {
    First,
    Second,
    Summer,
}

impl Semester {
    pub fn is_regular(self) -> bool {
        !matches!(self, Semester::Summer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Semester::First => "first",
            Semester::Second => "second",
            Semester::Summer => "summer",
        }
    }

    pub fn parse(value: &str) -> Option<Semester> {
        match value {
            "first" => Some(Semester::First),
            "second" => Some(Semester::Second),
            "summer" => Some(Semester::Summer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    pub code: String,
    pub duration_hours: u8,
    pub units: u32,
    pub room_type: String,
    #[serde(default)]
    pub tutorial: bool,
}

impl Course {
    /// Load weight counted against the professor's cap. Tutorials carry none.
    pub fn load_units(&self) -> u32 {
        if self.tutorial { 0 } else { self.units }
    }
}

/// A declared free window `[start_hour, end_hour)` on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWindow {
    pub day: Day,
    pub start_hour: Hour,
    pub end_hour: Hour,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Professor {
    pub id: ProfessorId,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    #[serde(default)]
    pub building: String,
    #[serde(default)]
    pub floor: i32,
    pub room_type: String,
    #[serde(default)]
    pub secondary_types: Vec<String>,
}

impl Room {
    pub fn hosts(&self, room_type: &str) -> bool {
        self.room_type == room_type || self.secondary_types.iter().any(|t| t == room_type)
    }
}

/// A student section (program, year, label); it cannot attend two classes at once.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Section {
    pub id: SectionId,
    pub program: String,
    pub year: u8,
    pub label: String,
}

/// A teaching obligation to be placed into the weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: AssignmentId,
    pub course_id: CourseId,
    #[serde(default)]
    pub professor_id: Option<ProfessorId>,
    pub department_id: DepartmentId,
    pub school_year_id: SchoolYearId,
    pub semester: Semester,
    #[serde(default)]
    pub room_type_override: Option<String>,
    #[serde(default)]
    pub section_ids: Vec<SectionId>,
}

impl Assignment {
    /// Tutorial courses run in both regular semesters.
    pub fn offered_in(&self, course: &Course, semester: Semester) -> bool {
        self.semester == semester
            || (course.tutorial && semester.is_regular() && self.semester.is_regular())
    }

    pub fn required_room_type<'a>(&'a self, course: &'a Course) -> &'a str {
        self.room_type_override.as_deref().unwrap_or(&course.room_type)
    }
}

/// Maximum units a professor of a given status may carry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPolicy {
    pub status: String,
    pub max_units: u32,
}

/// A placed class meeting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub day: Day,
    pub start_hour: Hour,
    pub end_hour: Hour,
    pub room_id: RoomId,
    pub assignment_id: AssignmentId,
    #[serde(default)]
    pub section_ids: Vec<SectionId>,
}

impl Schedule {
    pub fn duration(&self) -> u8 {
        self.end_hour.saturating_sub(self.start_hour)
    }

    pub fn overlaps(&self, other: &Schedule) -> bool {
        self.day == other.day
            && self.start_hour < other.end_hour
            && other.start_hour < self.end_hour
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "assignment {} on {} {:02}:00-{:02}:00 in room {}",
            self.assignment_id, self.day, self.start_hour, self.end_hour, self.room_id
        )
    }
}

/// A schedule row as persisted, tagged with the term it was saved for.
///
/// Tutorials run in both regular semesters, so the assignment alone does not
/// say which term a row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSchedule {
    pub school_year_id: SchoolYearId,
    pub semester: Semester,
    #[serde(flatten)]
    pub schedule: Schedule,
}

impl SavedSchedule {
    pub fn in_term(&self, school_year_id: SchoolYearId, semester: Semester) -> bool {
        self.school_year_id == school_year_id && self.semester == semester
    }
}

/// Everything the engine reads for one school year and semester.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableInput {
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub professors: Vec<Professor>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub status_policy: Vec<StatusPolicy>,
    /// Schedules already saved; they occupy rooms, professors and sections.
    #[serde(default)]
    pub existing_schedules: Vec<Schedule>,
}

/// A professor pushed over the status cap by a placement. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadWarning {
    pub professor_id: ProfessorId,
    pub assignment_id: AssignmentId,
    pub status: String,
    pub units: u32,
    pub max_units: u32,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Overload] Professor {} ({}) carries {} units after assignment {}, cap is {}",
            self.professor_id, self.status, self.units, self.assignment_id, self.max_units
        )
    }
}
