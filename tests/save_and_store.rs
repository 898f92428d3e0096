mod common;

use common::{Fixture, SCHOOL_YEAR, assert_conflict_free, campus};
use timetable_engine::batch::{
    DepartmentSaveStatus, GenerateRequest, Generator, Proposal, generate_from_store, save_proposal,
};
use timetable_engine::config::EngineConfig;
use timetable_engine::data::{Day, DepartmentId, Schedule, SchoolYearId, Semester, TimetableInput};
use timetable_engine::error::StoreError;
use timetable_engine::sqlite_store::SqliteStore;
use timetable_engine::store::{MemoryStore, TimetableStore};

fn request() -> GenerateRequest {
    GenerateRequest {
        school_year_id: SCHOOL_YEAR,
        semester: Semester::First,
        departments: None,
        variant_count: None,
    }
}

fn proposal_for(input: &TimetableInput) -> Proposal {
    let config = EngineConfig::default();
    Generator::new(input, &config)
        .unwrap()
        .generate(&request(), |_| {})
        .unwrap()
        .remove(0)
}

/// Wraps a memory store and refuses writes for chosen departments.
struct FlakyStore {
    inner: MemoryStore,
    failing: Vec<DepartmentId>,
}

impl TimetableStore for FlakyStore {
    fn load_input(
        &self,
        school_year_id: SchoolYearId,
        semester: Semester,
    ) -> Result<TimetableInput, StoreError> {
        self.inner.load_input(school_year_id, semester)
    }

    fn save_schedules(
        &mut self,
        department_id: DepartmentId,
        school_year_id: SchoolYearId,
        semester: Semester,
        schedules: &[Schedule],
    ) -> Result<usize, StoreError> {
        if self.failing.contains(&department_id) {
            return Err(StoreError::Rejected("disk full".into()));
        }
        self.inner.save_schedules(department_id, school_year_id, semester, schedules)
    }
}

#[test]
fn save_reports_per_department_and_isolates_failures() {
    let input = campus();
    let proposal = proposal_for(&input);
    let mut store = FlakyStore {
        inner: MemoryStore::new(input.clone()),
        failing: vec![2],
    };

    let report = save_proposal(&mut store, &proposal, None);
    assert_eq!(report.failed_departments(), vec![2]);
    assert!(matches!(
        report.per_department_status[&2],
        DepartmentSaveStatus::Failed { ref error } if error.contains("disk full")
    ));
    let expected: usize = [1, 3]
        .iter()
        .map(|d| proposal.departments[d].schedules.len())
        .sum();
    assert_eq!(report.saved_count, expected);
    assert_eq!(store.inner.saved().len(), expected);

    // retry only the failed department once the store recovers
    store.failing.clear();
    let retry = save_proposal(&mut store, &proposal, Some(&[2]));
    assert_eq!(retry.per_department_status.len(), 1);
    assert_eq!(
        retry.per_department_status[&2],
        DepartmentSaveStatus::Saved {
            count: proposal.departments[&2].schedules.len()
        }
    );
    assert_eq!(store.inner.saved().len(), proposal.schedules().count());
    assert_conflict_free(store.inner.saved().iter().map(|s| &s.schedule), &input);
}

#[test]
fn generating_after_a_save_only_schedules_what_is_left() {
    let input = Fixture::new()
        .department(1)
        .department(2)
        .course(1, 2, 3, "Lecture")
        .room(1, "Lecture", &[])
        .assignment(1, 1, None, 1, &[])
        .assignment(2, 1, None, 2, &[])
        .build();
    let config = EngineConfig::default();
    let mut store = MemoryStore::new(input);

    let first = generate_from_store(
        &store,
        &config,
        &GenerateRequest {
            departments: Some(vec![1]),
            ..request()
        },
        |_| {},
    )
    .unwrap()
    .remove(0);
    let report = save_proposal(&mut store, &first, None);
    assert_eq!(report.saved_count, 1);

    let second = generate_from_store(&store, &config, &request(), |_| {}).unwrap().remove(0);
    assert!(second.departments[&1].schedules.is_empty());
    let placed = &second.departments[&2].schedules[0];
    assert_eq!(placed.start_hour, 9);
    assert_eq!(second.summary.total_assignments, 1);
}

#[test]
fn sqlite_store_round_trips_catalog_and_schedules() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timetable.db");
    let input = campus();

    let mut store = SqliteStore::open(&path).unwrap();
    store.import(&input).unwrap();
    let loaded = store.load_input(SCHOOL_YEAR, Semester::First).unwrap();
    assert_eq!(loaded.assignments, input.assignments);
    assert_eq!(loaded.rooms, input.rooms);
    assert_eq!(loaded.professors, input.professors);
    assert_eq!(loaded.courses, input.courses);

    let proposal = proposal_for(&loaded);
    let report = save_proposal(&mut store, &proposal, None);
    assert!(report.failed_departments().is_empty());
    assert_eq!(report.saved_count, proposal.schedules().count());
    drop(store);

    let reopened = SqliteStore::open(&path).unwrap();
    let saved = reopened.load_schedules().unwrap();
    assert_eq!(saved.len(), proposal.schedules().count());
    assert!(saved.iter().all(|s| s.in_term(SCHOOL_YEAR, Semester::First)));
    assert_conflict_free(saved.iter().map(|s| &s.schedule), &input);

    let again = reopened.load_input(SCHOOL_YEAR, Semester::First).unwrap();
    assert_eq!(again.existing_schedules.len(), saved.len());
    let next_year = reopened.load_input(SCHOOL_YEAR + 1, Semester::First).unwrap();
    assert!(next_year.existing_schedules.is_empty());
}

#[test]
fn sqlite_department_save_is_atomic() {
    let input = Fixture::new()
        .department(1)
        .department(2)
        .course(1, 2, 3, "Lecture")
        .room(1, "Lecture", &[])
        .assignment(1, 1, None, 1, &[])
        .assignment(2, 1, None, 2, &[])
        .build();
    let mut store = SqliteStore::open_in_memory().unwrap();
    store.import(&input).unwrap();

    let own = Schedule {
        day: Day::Monday,
        start_hour: 7,
        end_hour: 9,
        room_id: 1,
        assignment_id: 1,
        section_ids: vec![],
    };
    let foreign = Schedule {
        start_hour: 9,
        end_hour: 11,
        assignment_id: 2,
        ..own.clone()
    };
    let err = store
        .save_schedules(1, SCHOOL_YEAR, Semester::First, &[own.clone(), foreign])
        .unwrap_err();
    assert!(matches!(err, StoreError::Rejected(_)));
    assert!(store.load_schedules().unwrap().is_empty());

    assert_eq!(store.save_schedules(1, SCHOOL_YEAR, Semester::First, &[own]).unwrap(), 1);
    assert_eq!(store.load_schedules().unwrap().len(), 1);
}

fn tutorial_catalog() -> TimetableInput {
    Fixture::new()
        .department(1)
        .tutorial(1, 1, "Lecture")
        .room(1, "Lecture", &[])
        .assignment(1, 1, None, 1, &[])
        .build()
}

// a tutorial filed under the first semester runs again in the second
fn schedule_tutorial_in_both_semesters(store: &mut dyn TimetableStore) {
    let config = EngineConfig::default();
    let first = generate_from_store(&*store, &config, &request(), |_| {}).unwrap().remove(0);
    assert_eq!(first.summary.total_scheduled, 1);
    assert_eq!(save_proposal(store, &first, None).saved_count, 1);

    let second_term = GenerateRequest {
        semester: Semester::Second,
        ..request()
    };
    let before = store.load_input(SCHOOL_YEAR, Semester::Second).unwrap();
    assert!(before.existing_schedules.is_empty());

    let second = generate_from_store(&*store, &config, &second_term, |_| {}).unwrap().remove(0);
    assert_eq!(second.summary.total_assignments, 1);
    assert_eq!(second.summary.total_scheduled, 1);
    let placed = &second.departments[&1].schedules[0];
    assert_eq!((placed.day, placed.start_hour), (Day::Monday, 7));
    assert_eq!(save_proposal(store, &second, None).saved_count, 1);

    for semester in [Semester::First, Semester::Second] {
        let input = store.load_input(SCHOOL_YEAR, semester).unwrap();
        assert_eq!(input.existing_schedules.len(), 1, "{semester:?}");
    }
}

#[test]
fn memory_store_keeps_tutorial_terms_apart() {
    let mut store = MemoryStore::new(tutorial_catalog());
    schedule_tutorial_in_both_semesters(&mut store);
}

#[test]
fn sqlite_store_keeps_tutorial_terms_apart() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    store.import(&tutorial_catalog()).unwrap();
    schedule_tutorial_in_both_semesters(&mut store);
}
