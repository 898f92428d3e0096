use crate::data::{DepartmentId, SavedSchedule, Schedule, SchoolYearId, Semester, TimetableInput};
use crate::error::StoreError;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// The data access boundary the engine reads from and `save_proposal` writes to.
pub trait TimetableStore: Send {
    /// Catalog data plus the schedules already saved for this term.
    fn load_input(
        &self,
        school_year_id: SchoolYearId,
        semester: Semester,
    ) -> Result<TimetableInput, StoreError>;

    /// Writes one department's schedules for a term atomically and returns how many were stored.
    fn save_schedules(
        &mut self,
        department_id: DepartmentId,
        school_year_id: SchoolYearId,
        semester: Semester,
        schedules: &[Schedule],
    ) -> Result<usize, StoreError>;
}

/// Keeps everything in memory; saved schedules live as long as the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    catalog: TimetableInput,
    saved: Vec<SavedSchedule>,
}

impl MemoryStore {
    /// Rows in `existing_schedules` are taken as saved in their assignment's own term.
    pub fn new(catalog: TimetableInput) -> Self {
        let saved = filed_in_own_term(&catalog, &catalog.existing_schedules);
        MemoryStore { catalog, saved }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        let catalog: TimetableInput = serde_json::from_str(&raw)?;
        info!(
            "Loaded seed data from {}: {} assignments, {} rooms, {} professors",
            path.display(),
            catalog.assignments.len(),
            catalog.rooms.len(),
            catalog.professors.len()
        );
        Ok(MemoryStore::new(catalog))
    }

    pub fn saved(&self) -> &[SavedSchedule] {
        &self.saved
    }
}

/// Tags term-less rows with the term their assignment is filed under.
/// Rows of unknown assignments are dropped.
pub(crate) fn filed_in_own_term(
    catalog: &TimetableInput,
    schedules: &[Schedule],
) -> Vec<SavedSchedule> {
    let terms: HashMap<_, _> = catalog
        .assignments
        .iter()
        .map(|a| (a.id, (a.school_year_id, a.semester)))
        .collect();
    schedules
        .iter()
        .filter_map(|schedule| match terms.get(&schedule.assignment_id) {
            Some(&(school_year_id, semester)) => Some(SavedSchedule {
                school_year_id,
                semester,
                schedule: schedule.clone(),
            }),
            None => {
                warn!("Dropping saved schedule ({}) of an unknown assignment", schedule);
                None
            }
        })
        .collect()
}

impl TimetableStore for MemoryStore {
    fn load_input(
        &self,
        school_year_id: SchoolYearId,
        semester: Semester,
    ) -> Result<TimetableInput, StoreError> {
        let mut input = self.catalog.clone();
        input.existing_schedules = self
            .saved
            .iter()
            .filter(|s| s.in_term(school_year_id, semester))
            .map(|s| s.schedule.clone())
            .collect();
        debug!(
            "Memory store: {} saved schedules in school year {} ({})",
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
        let owned: HashSet<_> = self
            .catalog
            .assignments
            .iter()
            .filter(|a| a.department_id == department_id)
            .map(|a| a.id)
            .collect();
        if let Some(stray) = schedules.iter().find(|s| !owned.contains(&s.assignment_id)) {
            return Err(StoreError::Rejected(format!(
                "assignment {} does not belong to department {}",
                stray.assignment_id, department_id
            )));
        }
        self.saved.extend(schedules.iter().map(|schedule| SavedSchedule {
            school_year_id,
            semester,
            schedule: schedule.clone(),
        }));
        Ok(schedules.len())
    }
}
