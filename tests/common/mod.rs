#![allow(dead_code)]

use timetable_engine::batch::find_conflicts;
use timetable_engine::data::{
    Assignment, AvailabilityWindow, Course, Day, Department, Hour, Professor, Room, Schedule,
    Section, Semester, StatusPolicy, TimetableInput,
};

pub const SCHOOL_YEAR: u32 = 2024;

/// Builds catalog data for one school year, first semester unless told otherwise.
pub struct Fixture {
    input: TimetableInput,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            input: TimetableInput {
                status_policy: vec![
                    StatusPolicy {
                        status: "Regular".into(),
                        max_units: 24,
                    },
                    StatusPolicy {
                        status: "PartTime".into(),
                        max_units: 6,
                    },
                ],
                ..TimetableInput::default()
            },
        }
    }

    pub fn department(mut self, id: u32) -> Self {
        self.input.departments.push(Department {
            id,
            name: format!("Dept {id}"),
        });
        self
    }

    pub fn course(mut self, id: u32, duration_hours: u8, units: u32, room_type: &str) -> Self {
        self.input.courses.push(Course {
            id,
            code: format!("C{id}"),
            duration_hours,
            units,
            room_type: room_type.into(),
            tutorial: false,
        });
        self
    }

    pub fn tutorial(mut self, id: u32, duration_hours: u8, room_type: &str) -> Self {
        self.input.courses.push(Course {
            id,
            code: format!("T{id}"),
            duration_hours,
            units: 3,
            room_type: room_type.into(),
            tutorial: true,
        });
        self
    }

    pub fn professor(self, id: u32, windows: &[(Day, Hour, Hour)]) -> Self {
        self.professor_with_status(id, "Regular", windows)
    }

    pub fn professor_with_status(
        mut self,
        id: u32,
        status: &str,
        windows: &[(Day, Hour, Hour)],
    ) -> Self {
        self.input.professors.push(Professor {
            id,
            name: format!("Prof {id}"),
            status: status.into(),
            availability: windows
                .iter()
                .map(|&(day, start_hour, end_hour)| AvailabilityWindow {
                    day,
                    start_hour,
                    end_hour,
                })
                .collect(),
        });
        self
    }

    pub fn room(mut self, id: u32, room_type: &str, secondary: &[&str]) -> Self {
        self.input.rooms.push(Room {
            id,
            code: format!("R{id}"),
            building: "Main".into(),
            floor: 1,
            room_type: room_type.into(),
            secondary_types: secondary.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn section(mut self, id: u32) -> Self {
        self.input.sections.push(Section {
            id,
            program: "BSCS".into(),
            year: 1,
            label: format!("S{id}"),
        });
        self
    }

    pub fn assignment(
        self,
        id: u32,
        course_id: u32,
        professor_id: Option<u32>,
        department_id: u32,
        sections: &[u32],
    ) -> Self {
        self.assignment_in(id, course_id, professor_id, department_id, sections, Semester::First)
    }

    pub fn assignment_in(
        mut self,
        id: u32,
        course_id: u32,
        professor_id: Option<u32>,
        department_id: u32,
        sections: &[u32],
        semester: Semester,
    ) -> Self {
        self.input.assignments.push(Assignment {
            id,
            course_id,
            professor_id,
            department_id,
            school_year_id: SCHOOL_YEAR,
            semester,
            room_type_override: None,
            section_ids: sections.to_vec(),
        });
        self
    }

    pub fn build(self) -> TimetableInput {
        self.input
    }
}

/// A department-heavy catalog: three departments competing for six rooms.
pub fn campus() -> TimetableInput {
    let week = |start: Hour, end: Hour| -> Vec<(Day, Hour, Hour)> {
        Day::ALL.iter().map(|&d| (d, start, end)).collect()
    };
    let mut f = Fixture::new()
        .department(3)
        .department(1)
        .department(2)
        .course(1, 3, 3, "Lab")
        .course(2, 2, 3, "Lecture")
        .course(3, 1, 2, "Lecture")
        .course(4, 3, 4, "Studio")
        .tutorial(5, 1, "Lecture")
        .room(1, "Lab", &[])
        .room(2, "Lecture", &[])
        .room(3, "Lecture", &["Studio"])
        .room(4, "Lab", &["Lecture"])
        .room(5, "Lecture", &[])
        .room(6, "Gym", &[]);
    for p in 1..=8u32 {
        let windows = match p % 4 {
            0 => week(7, 21),
            1 => week(8, 12),
            2 => vec![(Day::Monday, 13, 17), (Day::Wednesday, 13, 17), (Day::Friday, 8, 11)],
            _ => vec![(Day::Tuesday, 9, 15), (Day::Thursday, 9, 15)],
        };
        let status = if p % 3 == 0 { "PartTime" } else { "Regular" };
        f = f.professor_with_status(p, status, &windows);
    }
    for s in 1..=12u32 {
        f = f.section(s);
    }
    for id in 1..=48u32 {
        let course = 1 + id % 5;
        let professor = if course == 5 { None } else { Some(1 + id % 8) };
        let department = 1 + id % 3;
        let sections = [1 + id % 12, 1 + (id * 7) % 12];
        f = f.assignment(id, course, professor, department, &sections);
    }
    f.build()
}

pub fn assert_conflict_free<'s>(
    schedules: impl IntoIterator<Item = &'s Schedule>,
    input: &TimetableInput,
) {
    let conflicts = find_conflicts(schedules, input);
    assert!(conflicts.is_empty(), "conflicts: {conflicts:?}");
}
