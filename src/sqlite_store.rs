use crate::data::{
    Assignment, AvailabilityWindow, Course, Day, Department, DepartmentId, Professor, Room,
    SavedSchedule, Schedule, SchoolYearId, Section, Semester, StatusPolicy, TimetableInput,
};
use crate::error::StoreError;
use crate::store::{TimetableStore, filed_in_own_term};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS departments (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    duration_hours INTEGER NOT NULL,
    units INTEGER NOT NULL,
    room_type TEXT NOT NULL,
    tutorial INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS professors (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    status TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS availability (
    professor_id INTEGER NOT NULL REFERENCES professors(id),
    day INTEGER NOT NULL,
    start_hour INTEGER NOT NULL,
    end_hour INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS rooms (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    building TEXT NOT NULL DEFAULT '',
    floor INTEGER NOT NULL DEFAULT 0,
    room_type TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS room_secondary_types (
    room_id INTEGER NOT NULL REFERENCES rooms(id),
    room_type TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sections (
    id INTEGER PRIMARY KEY,
    program TEXT NOT NULL,
    year INTEGER NOT NULL,
    label TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS assignments (
    id INTEGER PRIMARY KEY,
    course_id INTEGER NOT NULL REFERENCES courses(id),
    professor_id INTEGER REFERENCES professors(id),
    department_id INTEGER NOT NULL REFERENCES departments(id),
    school_year_id INTEGER NOT NULL,
    semester TEXT NOT NULL,
    room_type_override TEXT
);
CREATE TABLE IF NOT EXISTS assignment_sections (
    assignment_id INTEGER NOT NULL REFERENCES assignments(id),
    section_id INTEGER NOT NULL REFERENCES sections(id)
);
CREATE TABLE IF NOT EXISTS status_policy (
    status TEXT PRIMARY KEY,
    max_units INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS schedules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    assignment_id INTEGER NOT NULL REFERENCES assignments(id),
    school_year_id INTEGER NOT NULL,
    semester TEXT NOT NULL,
    room_id INTEGER NOT NULL REFERENCES rooms(id),
    day INTEGER NOT NULL,
    start_hour INTEGER NOT NULL,
    end_hour INTEGER NOT NULL,
    UNIQUE (school_year_id, semester, room_id, day, start_hour)
);
CREATE TABLE IF NOT EXISTS schedule_sections (
    schedule_id INTEGER NOT NULL REFERENCES schedules(id),
    section_id INTEGER NOT NULL REFERENCES sections(id)
);
"#;

/// Durable store on SQLite. Each department save is one transaction.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!("Opening timetable database {}", path.display());
        SqliteStore::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        SqliteStore::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }

    /// Writes a whole catalog in one transaction. Saved schedules it carries are
    /// filed under their assignment's own term.
    pub fn import(&mut self, input: &TimetableInput) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for d in &input.departments {
            tx.execute(
                "INSERT INTO departments (id, name) VALUES (?1, ?2)",
                params![d.id, d.name],
            )?;
        }
        for c in &input.courses {
            tx.execute(
                "INSERT INTO courses (id, code, duration_hours, units, room_type, tutorial)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![c.id, c.code, c.duration_hours, c.units, c.room_type, c.tutorial],
            )?;
        }
        for p in &input.professors {
            tx.execute(
                "INSERT INTO professors (id, name, status) VALUES (?1, ?2, ?3)",
                params![p.id, p.name, p.status],
            )?;
            for w in &p.availability {
                tx.execute(
                    "INSERT INTO availability (professor_id, day, start_hour, end_hour)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![p.id, w.day.index(), w.start_hour, w.end_hour],
                )?;
            }
        }
        for r in &input.rooms {
            tx.execute(
                "INSERT INTO rooms (id, code, building, floor, room_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![r.id, r.code, r.building, r.floor, r.room_type],
            )?;
            for t in &r.secondary_types {
                tx.execute(
                    "INSERT INTO room_secondary_types (room_id, room_type) VALUES (?1, ?2)",
                    params![r.id, t],
                )?;
            }
        }
        for s in &input.sections {
            tx.execute(
                "INSERT INTO sections (id, program, year, label) VALUES (?1, ?2, ?3, ?4)",
                params![s.id, s.program, s.year, s.label],
            )?;
        }
        for a in &input.assignments {
            tx.execute(
                "INSERT INTO assignments
                 (id, course_id, professor_id, department_id, school_year_id, semester,
                  room_type_override)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    a.id,
                    a.course_id,
                    a.professor_id,
                    a.department_id,
                    a.school_year_id,
                    a.semester.as_str(),
                    a.room_type_override
                ],
            )?;
            for section_id in &a.section_ids {
                tx.execute(
                    "INSERT INTO assignment_sections (assignment_id, section_id) VALUES (?1, ?2)",
                    params![a.id, section_id],
                )?;
            }
        }
        for p in &input.status_policy {
            tx.execute(
                "INSERT INTO status_policy (status, max_units) VALUES (?1, ?2)",
                params![p.status, p.max_units],
            )?;
        }
        for saved in filed_in_own_term(input, &input.existing_schedules) {
            insert_schedule(&tx, &saved)?;
        }
        tx.commit()?;
        info!(
            "Imported {} assignments, {} rooms and {} professors",
            input.assignments.len(),
            input.rooms.len(),
            input.professors.len()
        );
        Ok(())
    }

    fn load_catalog(&self) -> Result<TimetableInput, StoreError> {
        let conn = &self.conn;

        let departments = conn
            .prepare("SELECT id, name FROM departments ORDER BY id")?
            .query_map([], |row| {
                Ok(Department {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let courses = conn
            .prepare(
                "SELECT id, code, duration_hours, units, room_type, tutorial
                 FROM courses ORDER BY id",
            )?
            .query_map([], |row| {
                Ok(Course {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    duration_hours: row.get(2)?,
                    units: row.get(3)?,
                    room_type: row.get(4)?,
                    tutorial: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut windows: HashMap<u32, Vec<AvailabilityWindow>> = HashMap::new();
        let raw_windows = conn
            .prepare(
                "SELECT professor_id, day, start_hour, end_hour FROM availability ORDER BY rowid",
            )?
            .query_map([], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u8>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, u8>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (professor_id, day, start_hour, end_hour) in raw_windows {
            windows.entry(professor_id).or_default().push(AvailabilityWindow {
                day: day_from_column(day)?,
                start_hour,
                end_hour,
            });
        }
        let professors = conn
            .prepare("SELECT id, name, status FROM professors ORDER BY id")?
            .query_map([], |row| {
                Ok(Professor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    status: row.get(2)?,
                    availability: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|mut p| {
                p.availability = windows.remove(&p.id).unwrap_or_default();
                p
            })
            .collect();

        let mut secondary: HashMap<u32, Vec<String>> = HashMap::new();
        for pair in conn
            .prepare("SELECT room_id, room_type FROM room_secondary_types ORDER BY rowid")?
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
        {
            let (room_id, room_type) = pair?;
            secondary.entry(room_id).or_default().push(room_type);
        }
        let rooms = conn
            .prepare("SELECT id, code, building, floor, room_type FROM rooms ORDER BY id")?
            .query_map([], |row| {
                Ok(Room {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    building: row.get(2)?,
                    floor: row.get(3)?,
                    room_type: row.get(4)?,
                    secondary_types: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|mut r| {
                r.secondary_types = secondary.remove(&r.id).unwrap_or_default();
                r
            })
            .collect();

        let sections = conn
            .prepare("SELECT id, program, year, label FROM sections ORDER BY id")?
            .query_map([], |row| {
                Ok(Section {
                    id: row.get(0)?,
                    program: row.get(1)?,
                    year: row.get(2)?,
                    label: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut assignment_sections: HashMap<u32, Vec<u32>> = HashMap::new();
        for pair in conn
            .prepare("SELECT assignment_id, section_id FROM assignment_sections ORDER BY rowid")?
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?)))?
        {
            let (assignment_id, section_id) = pair?;
            assignment_sections.entry(assignment_id).or_default().push(section_id);
        }
        let raw_assignments = conn
            .prepare(
                "SELECT id, course_id, professor_id, department_id, school_year_id, semester,
                        room_type_override
                 FROM assignments ORDER BY id",
            )?
            .query_map([], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut assignments = Vec::with_capacity(raw_assignments.len());
        for (
            id,
            course_id,
            professor_id,
            department_id,
            school_year_id,
            semester,
            room_type_override,
        ) in raw_assignments
        {
            let semester = semester_from_column(&semester)?;
            assignments.push(Assignment {
                id,
                course_id,
                professor_id,
                department_id,
                school_year_id,
                semester,
                room_type_override,
                section_ids: assignment_sections.remove(&id).unwrap_or_default(),
            });
        }

        let status_policy = conn
            .prepare("SELECT status, max_units FROM status_policy ORDER BY status")?
            .query_map([], |row| {
                Ok(StatusPolicy {
                    status: row.get(0)?,
                    max_units: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TimetableInput {
            departments,
            courses,
            professors,
            rooms,
            sections,
            assignments,
            status_policy,
            existing_schedules: Vec::new(),
        })
    }

    /// Every saved schedule across all terms, ordered by insertion.
    pub fn load_schedules(&self) -> Result<Vec<SavedSchedule>, StoreError> {
        let mut schedule_sections: HashMap<i64, Vec<u32>> = HashMap::new();
        for pair in self
            .conn
            .prepare("SELECT schedule_id, section_id FROM schedule_sections ORDER BY rowid")?
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?)))?
        {
            let (schedule_id, section_id) = pair?;
            schedule_sections.entry(schedule_id).or_default().push(section_id);
        }
        let rows = self
            .conn
            .prepare(
                "SELECT id, assignment_id, school_year_id, semester, room_id, day,
                        start_hour, end_hour
                 FROM schedules ORDER BY id",
            )?
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u8>(5)?,
                    row.get::<_, u8>(6)?,
                    row.get::<_, u8>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut saved = Vec::with_capacity(rows.len());
        for (id, assignment_id, school_year_id, semester, room_id, day, start_hour, end_hour) in
            rows
        {
            saved.push(SavedSchedule {
                school_year_id,
                semester: semester_from_column(&semester)?,
                schedule: Schedule {
                    day: day_from_column(day)?,
                    start_hour,
                    end_hour,
                    room_id,
                    assignment_id,
                    section_ids: schedule_sections.remove(&id).unwrap_or_default(),
                },
            });
        }
        Ok(saved)
    }
}

fn day_from_column(value: u8) -> Result<Day, StoreError> {
    Day::from_index(value)
        .ok_or_else(|| StoreError::Rejected(format!("day index {value} out of range")))
}

fn semester_from_column(value: &str) -> Result<Semester, StoreError> {
    Semester::parse(value)
        .ok_or_else(|| StoreError::Rejected(format!("unknown semester '{value}'")))
}

fn insert_schedule(conn: &Connection, saved: &SavedSchedule) -> Result<(), StoreError> {
    let schedule = &saved.schedule;
    conn.execute(
        "INSERT INTO schedules
         (assignment_id, school_year_id, semester, room_id, day, start_hour, end_hour)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            schedule.assignment_id,
            saved.school_year_id,
            saved.semester.as_str(),
            schedule.room_id,
            schedule.day.index(),
            schedule.start_hour,
            schedule.end_hour
        ],
    )?;
    let schedule_id = conn.last_insert_rowid();
    for section_id in &schedule.section_ids {
        conn.execute(
            "INSERT INTO schedule_sections (schedule_id, section_id) VALUES (?1, ?2)",
            params![schedule_id, section_id],
        )?;
    }
    Ok(())
}

impl TimetableStore for SqliteStore {
    fn load_input(
        &self,
        school_year_id: SchoolYearId,
        semester: Semester,
    ) -> Result<TimetableInput, StoreError> {
        let mut input = self.load_catalog()?;
        input.existing_schedules = self
            .load_schedules()?
            .into_iter()
            .filter(|s| s.in_term(school_year_id, semester))
            .map(|s| s.schedule)
            .collect();
        debug!(
            "SQLite store: {} assignments, {} saved schedules for school year {} ({})",
            input.assignments.len(),
            input.existing_schedules.len(),
            school_year_id,
            semester.as_str()
        );
        Ok(input)
    }

    fn save_schedules(
        &mut self,
        department_id: DepartmentId,
        school_year_id: SchoolYearId,
        semester: Semester,
        schedules: &[Schedule],
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        for schedule in schedules {
            let owner: Option<u32> = tx
                .query_row(
                    "SELECT department_id FROM assignments WHERE id = ?1",
                    params![schedule.assignment_id],
                    |row| row.get(0),
                )
                .optional()?;
            if owner != Some(department_id) {
                // dropping the transaction rolls back rows written so far
                return Err(StoreError::Rejected(format!(
                    "assignment {} does not belong to department {}",
                    schedule.assignment_id, department_id
                )));
            }
            let saved = SavedSchedule {
                school_year_id,
                semester,
                schedule: schedule.clone(),
            };
            insert_schedule(&tx, &saved)?;
        }
        tx.commit()?;
        Ok(schedules.len())
    }
}
