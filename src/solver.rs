use crate::availability::AvailabilityIndex;
use crate::candidates::{CandidateSlots, RoomMatch, SlotRequest};
use crate::config::{AssignmentOrder, EngineConfig};
use crate::data::{
    Assignment, AssignmentId, Course, CourseId, Day, Department, DepartmentId, LoadWarning,
    Professor, ProfessorId, Room, Schedule, SchoolYearId, Semester, SectionId, TimetableInput,
};
use crate::error::EngineError;
use crate::occupancy::{OccupancyTracker, Reservation};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Read-only lookups over a validated `TimetableInput`.
#[derive(Debug)]
pub struct Catalog<'a> {
    pub input: &'a TimetableInput,
    courses: HashMap<CourseId, &'a Course>,
    professors: HashMap<ProfessorId, &'a Professor>,
    departments: HashMap<DepartmentId, &'a Department>,
    assignments: HashMap<AssignmentId, &'a Assignment>,
    max_units: HashMap<&'a str, u32>,
    rooms: Vec<&'a Room>,
    availability: AvailabilityIndex,
    already_scheduled: HashSet<AssignmentId>,
}

impl<'a> Catalog<'a> {
    pub fn new(input: &'a TimetableInput) -> Result<Self, EngineError> {
        ensure_unique("department", input.departments.iter().map(|d| d.id))?;
        ensure_unique("course", input.courses.iter().map(|c| c.id))?;
        ensure_unique("professor", input.professors.iter().map(|p| p.id))?;
        ensure_unique("room", input.rooms.iter().map(|r| r.id))?;
        ensure_unique("section", input.sections.iter().map(|s| s.id))?;
        ensure_unique("assignment", input.assignments.iter().map(|a| a.id))?;

        let courses: HashMap<CourseId, &Course> =
            input.courses.iter().map(|c| (c.id, c)).collect();
        let professors: HashMap<ProfessorId, &Professor> =
            input.professors.iter().map(|p| (p.id, p)).collect();
        let departments: HashMap<DepartmentId, &Department> =
            input.departments.iter().map(|d| (d.id, d)).collect();
        let assignments: HashMap<AssignmentId, &Assignment> =
            input.assignments.iter().map(|a| (a.id, a)).collect();
        let sections: HashSet<SectionId> = input.sections.iter().map(|s| s.id).collect();
        let max_units = input
            .status_policy
            .iter()
            .map(|p| (p.status.as_str(), p.max_units))
            .collect();

        for course in &input.courses {
            if course.duration_hours == 0 {
                return Err(EngineError::InvalidInput(format!(
                    "course {} has zero duration",
                    course.code
                )));
            }
        }
        for professor in &input.professors {
            for window in &professor.availability {
                if window.start_hour >= window.end_hour || window.end_hour > 24 {
                    return Err(EngineError::InvalidInput(format!(
                        "professor {} has an invalid availability window {} {}-{}",
                        professor.id, window.day, window.start_hour, window.end_hour
                    )));
                }
            }
        }
        for assignment in &input.assignments {
            let missing = |entity: &'static str, id: u32| EngineError::UnknownReference {
                assignment_id: assignment.id,
                entity,
                id,
            };
            if !courses.contains_key(&assignment.course_id) {
                return Err(missing("course", assignment.course_id));
            }
            if !departments.contains_key(&assignment.department_id) {
                return Err(missing("department", assignment.department_id));
            }
            if let Some(professor_id) = assignment.professor_id {
                if !professors.contains_key(&professor_id) {
                    return Err(missing("professor", professor_id));
                }
            }
            if let Some(&section_id) =
                assignment.section_ids.iter().find(|s| !sections.contains(s))
            {
                return Err(missing("section", section_id));
            }
        }

        let rooms = input.rooms.iter().sorted_by_key(|r| r.id).collect();
        let already_scheduled = input.existing_schedules.iter().map(|s| s.assignment_id).collect();

        Ok(Catalog {
            input,
            courses,
            professors,
            departments,
            assignments,
            max_units,
            rooms,
            availability: AvailabilityIndex::build(&input.professors),
            already_scheduled,
        })
    }

    pub fn course(&self, id: CourseId) -> Result<&'a Course, EngineError> {
        self.courses
            .get(&id)
            .copied()
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown course {id}")))
    }

    pub fn assignment(&self, id: AssignmentId) -> Option<&'a Assignment> {
        self.assignments.get(&id).copied()
    }

    pub fn has_department(&self, id: DepartmentId) -> bool {
        self.departments.contains_key(&id)
    }

    /// Department ids in ascending order, the fixed processing order of a batch.
    pub fn department_ids(&self) -> Vec<DepartmentId> {
        self.departments.keys().copied().sorted().collect()
    }

    /// Assignments of one department still to be placed this term.
    pub fn pending_for(
        &self,
        department_id: DepartmentId,
        school_year_id: SchoolYearId,
        semester: Semester,
    ) -> Result<Vec<&'a Assignment>, EngineError> {
        let mut pending = Vec::new();
        for assignment in &self.input.assignments {
            if assignment.department_id != department_id
                || assignment.school_year_id != school_year_id
                || self.already_scheduled.contains(&assignment.id)
            {
                continue;
            }
            if assignment.offered_in(self.course(assignment.course_id)?, semester) {
                pending.push(assignment);
            }
        }
        Ok(pending)
    }

    /// Rooms by ascending id, rotated left by `seed` positions.
    pub fn rooms_for_seed(&self, seed: u32) -> Vec<&'a Room> {
        let mut rooms = self.rooms.clone();
        if !rooms.is_empty() {
            let shift = seed as usize % rooms.len();
            rooms.rotate_left(shift);
        }
        rooms
    }
}

fn ensure_unique(entity: &str, ids: impl Iterator<Item = u32>) -> Result<(), EngineError> {
    match ids.duplicates().next() {
        Some(id) => Err(EngineError::InvalidInput(format!("duplicate {entity} id {id}"))),
        None => Ok(()),
    }
}

/// Strict-pass output for one department.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartmentRun {
    pub department_id: DepartmentId,
    pub schedules: Vec<Schedule>,
    pub failures: Vec<AssignmentId>,
    pub warnings: Vec<LoadWarning>,
}

/// A placement made by the relaxation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaxedPlacement {
    pub department_id: DepartmentId,
    pub schedule: Schedule,
    pub warning: Option<LoadWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaxOutcome {
    pub placed: Vec<RelaxedPlacement>,
    pub unscheduled: Vec<AssignmentId>,
}

/// Mutable state of one generation run: occupancy plus running professor loads.
pub struct Run<'c, 'a> {
    catalog: &'c Catalog<'a>,
    order: AssignmentOrder,
    days: Vec<Day>,
    rooms: Vec<&'a Room>,
    tracker: OccupancyTracker,
    loads: HashMap<ProfessorId, u32>,
}

impl<'c, 'a> Run<'c, 'a> {
    /// Fresh tracker seeded with the already-saved schedules.
    pub fn new(catalog: &'c Catalog<'a>, config: &EngineConfig, seed: u32) -> Self {
        let mut run = Run {
            catalog,
            order: config.assignment_order,
            days: config.ordered_days(),
            rooms: catalog.rooms_for_seed(seed),
            tracker: OccupancyTracker::new(config.operating_hours),
            loads: HashMap::new(),
        };
        run.preload_existing();
        run
    }

    fn preload_existing(&mut self) {
        let mut counted = HashSet::new();
        for schedule in &self.catalog.input.existing_schedules {
            let assignment = self.catalog.assignment(schedule.assignment_id);
            let reservation = Reservation {
                day: schedule.day,
                start: schedule.start_hour,
                duration: schedule.duration(),
                room_id: schedule.room_id,
                professor_id: assignment.and_then(|a| a.professor_id),
                section_ids: schedule.section_ids.clone(),
            };
            let skipped = self.tracker.preload(&reservation);
            if skipped > 0 {
                warn!(
                    "Saved schedule ({}) clashes with other saved rows on {} resource(s)",
                    schedule, skipped
                );
            }
            if let Some(assignment) = assignment {
                if counted.insert(assignment.id) {
                    if let (Some(professor_id), Ok(course)) =
                        (assignment.professor_id, self.catalog.course(assignment.course_id))
                    {
                        *self.loads.entry(professor_id).or_default() += course.load_units();
                    }
                }
            }
        }
        trace!(
            "Preloaded {} saved schedules into the occupancy tracker.",
            self.catalog.input.existing_schedules.len()
        );
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    /// Sorts assignments so the hardest-to-place items pick first.
    pub fn order_assignments(&self, assignments: &mut [&'a Assignment]) {
        match self.order {
            AssignmentOrder::ById => assignments.sort_by_key(|a| a.id),
            AssignmentOrder::LongestFirst => assignments.sort_by_key(|a| {
                let duration = self.catalog.course(a.course_id).map_or(0, |c| c.duration_hours);
                (std::cmp::Reverse(duration), a.id)
            }),
        }
    }

    /// Reserves the first feasible slot for the assignment, if any.
    pub fn try_place(
        &mut self,
        assignment: &Assignment,
        mode: RoomMatch,
    ) -> Result<Option<Schedule>, EngineError> {
        let course = self.catalog.course(assignment.course_id)?;
        let request = SlotRequest {
            duration: course.duration_hours,
            room_type: assignment.required_room_type(course),
            professor_id: assignment.professor_id,
            section_ids: &assignment.section_ids,
        };
        let candidate = CandidateSlots::new(
            request.clone(),
            mode,
            &self.days,
            &self.rooms,
            &self.catalog.availability,
            &self.tracker,
        )
        .next();
        let Some(candidate) = candidate else {
            return Ok(None);
        };
        self.tracker.reserve_all(&request.reservation(candidate))?;
        Ok(Some(Schedule {
            day: candidate.day,
            start_hour: candidate.start,
            end_hour: candidate.start + course.duration_hours,
            room_id: candidate.room_id,
            assignment_id: assignment.id,
            section_ids: assignment.section_ids.clone(),
        }))
    }

    /// Gives back a placement made earlier in this run.
    pub fn unplace(&mut self, schedule: &Schedule) -> Result<(), EngineError> {
        let assignment = self.catalog.assignment(schedule.assignment_id);
        let professor_id = assignment.and_then(|a| a.professor_id);
        self.tracker.release_all(&Reservation {
            day: schedule.day,
            start: schedule.start_hour,
            duration: schedule.duration(),
            room_id: schedule.room_id,
            professor_id,
            section_ids: schedule.section_ids.clone(),
        })?;
        if let (Some(professor_id), Some(assignment)) = (professor_id, assignment) {
            let units = self.catalog.course(assignment.course_id)?.load_units();
            if let Some(load) = self.loads.get_mut(&professor_id) {
                *load = load.saturating_sub(units);
            }
        }
        Ok(())
    }

    // adds the course units to the professor's running total
    fn record_load(&mut self, assignment: &Assignment) -> Result<Option<LoadWarning>, EngineError> {
        let Some(professor_id) = assignment.professor_id else {
            return Ok(None);
        };
        let units = self.catalog.course(assignment.course_id)?.load_units();
        let load = self.loads.entry(professor_id).or_default();
        *load += units;
        let total = *load;

        let Some(professor) = self.catalog.professors.get(&professor_id) else {
            return Ok(None);
        };
        let Some(&max_units) = self.catalog.max_units.get(professor.status.as_str()) else {
            debug!("No unit cap for status '{}' of professor {}", professor.status, professor_id);
            return Ok(None);
        };
        if total > max_units {
            let warning = LoadWarning {
                professor_id,
                assignment_id: assignment.id,
                status: professor.status.clone(),
                units: total,
                max_units,
            };
            warn!("{}", warning);
            return Ok(Some(warning));
        }
        Ok(None)
    }

    pub fn professor_load(&self, professor_id: ProfessorId) -> u32 {
        self.loads.get(&professor_id).copied().unwrap_or(0)
    }

    /// Strict pass for one department: greedy first-fit in a fixed order.
    pub fn schedule_department(
        &mut self,
        department_id: DepartmentId,
        mut assignments: Vec<&'a Assignment>,
    ) -> Result<DepartmentRun, EngineError> {
        let start_time = Instant::now();
        self.order_assignments(&mut assignments);
        info!(
            "Scheduling department {} with {} assignments across {} rooms...",
            department_id,
            assignments.len(),
            self.rooms.len()
        );

        let mut result = DepartmentRun {
            department_id,
            ..DepartmentRun::default()
        };
        for assignment in assignments {
            match self.try_place(assignment, RoomMatch::Strict)? {
                Some(schedule) => {
                    trace!("Placed {}", schedule);
                    result.warnings.extend(self.record_load(assignment)?);
                    result.schedules.push(schedule);
                }
                None => {
                    debug!("No strict slot for assignment {}", assignment.id);
                    result.failures.push(assignment.id);
                }
            }
        }
        info!(
            "Department {}: {} placed, {} failed in {:.2?}",
            department_id,
            result.schedules.len(),
            result.failures.len(),
            start_time.elapsed()
        );
        Ok(result)
    }

    /// Second chance for strict failures with the room-type requirement dropped.
    ///
    /// Professor availability and every occupancy rule still apply.
    pub fn relax(&mut self, failed: &[AssignmentId]) -> Result<RelaxOutcome, EngineError> {
        let mut retry: Vec<&'a Assignment> = failed
            .iter()
            .filter_map(|&id| self.catalog.assignment(id))
            .collect();
        self.order_assignments(&mut retry);
        info!("Retrying {} assignments with relaxed room matching...", retry.len());

        let mut outcome = RelaxOutcome::default();
        for assignment in retry {
            match self.try_place(assignment, RoomMatch::Relaxed)? {
                Some(schedule) => {
                    debug!("Relaxed placement: {}", schedule);
                    let warning = self.record_load(assignment)?;
                    outcome.placed.push(RelaxedPlacement {
                        department_id: assignment.department_id,
                        schedule,
                        warning,
                    });
                }
                None => outcome.unscheduled.push(assignment.id),
            }
        }
        outcome.unscheduled.sort();
        info!(
            "Relaxation placed {}, {} left for manual assignment",
            outcome.placed.len(),
            outcome.unscheduled.len()
        );
        Ok(outcome)
    }
}
