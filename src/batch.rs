use crate::config::EngineConfig;
use crate::data::{
    AssignmentId, DepartmentId, LoadWarning, ProfessorId, Schedule, SchoolYearId, Semester,
    TimetableInput,
};
use crate::error::{EngineError, StoreError};
use crate::occupancy::ResourceKind;
use crate::solver::{Catalog, Run};
use crate::store::TimetableStore;
use itertools::Itertools;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Instant;

/// Parameters of a cross-department generation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub school_year_id: SchoolYearId,
    pub semester: Semester,
    #[serde(default)]
    pub departments: Option<Vec<DepartmentId>>,
    #[serde(default)]
    pub variant_count: Option<u32>,
}

/// Reported after each department finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub variant: u32,
    pub variant_count: u32,
    pub department_index: usize,
    pub department_total: usize,
    pub department_id: DepartmentId,
}

/// Result of generating a single department.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentResult {
    pub schedules: Vec<Schedule>,
    pub failures: Vec<AssignmentId>,
    pub warnings: Vec<LoadWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentProposal {
    pub schedules: Vec<Schedule>,
    /// Assignments the strict pass could not place.
    pub strict_failures: Vec<AssignmentId>,
    /// Assignments placed only once room types were relaxed.
    pub relaxed: Vec<AssignmentId>,
    /// Assignments left for manual handling.
    pub unscheduled: Vec<AssignmentId>,
    pub warnings: Vec<LoadWarning>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_assignments: usize,
    pub scheduled_strict: usize,
    pub scheduled_relaxed: usize,
    pub total_scheduled: usize,
    pub unscheduled: usize,
    pub warnings: usize,
}

/// An unpersisted generation result, reviewable before `save_proposal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub school_year_id: SchoolYearId,
    pub semester: Semester,
    pub variant: u32,
    pub departments: BTreeMap<DepartmentId, DepartmentProposal>,
    /// Every assignment neither pass could place, for the manual tool.
    pub unscheduled: Vec<AssignmentId>,
    pub summary: Summary,
}

impl Proposal {
    pub fn schedules(&self) -> impl Iterator<Item = &Schedule> {
        self.departments.values().flat_map(|d| d.schedules.iter())
    }

    /// Schedules of the listed departments, or of every department for `None`.
    pub fn schedules_in<'p>(
        &'p self,
        departments: Option<&'p [DepartmentId]>,
    ) -> impl Iterator<Item = &'p Schedule> {
        self.departments
            .iter()
            .filter(move |&(id, _)| departments.is_none_or(|subset| subset.contains(id)))
            .flat_map(|(_, d)| d.schedules.iter())
    }
}

/// Runs strict passes per department, then one relaxation pass, on a fresh tracker.
pub struct Generator<'a> {
    config: &'a EngineConfig,
    catalog: Catalog<'a>,
}

impl<'a> Generator<'a> {
    pub fn new(input: &'a TimetableInput, config: &'a EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Generator {
            config,
            catalog: Catalog::new(input)?,
        })
    }

    pub fn catalog(&self) -> &Catalog<'a> {
        &self.catalog
    }

    /// Strict and relaxed passes over one department alone.
    pub fn generate_for_department(
        &self,
        department_id: DepartmentId,
        school_year_id: SchoolYearId,
        semester: Semester,
    ) -> Result<DepartmentResult, EngineError> {
        if !self.catalog.has_department(department_id) {
            return Err(EngineError::InvalidInput(format!("unknown department {department_id}")));
        }
        let mut run = Run::new(&self.catalog, self.config, 0);
        let pending = self.catalog.pending_for(department_id, school_year_id, semester)?;
        let strict = run.schedule_department(department_id, pending)?;
        let relaxed = run.relax(&strict.failures)?;

        let mut result = DepartmentResult {
            schedules: strict.schedules,
            failures: relaxed.unscheduled,
            warnings: strict.warnings,
        };
        for placement in relaxed.placed {
            result.schedules.push(placement.schedule);
            result.warnings.extend(placement.warning);
        }
        Ok(result)
    }

    /// One proposal per requested variant, each on its own tracker.
    pub fn generate(
        &self,
        request: &GenerateRequest,
        mut progress: impl FnMut(Progress),
    ) -> Result<Vec<Proposal>, EngineError> {
        let variant_count = request.variant_count.unwrap_or(1);
        if variant_count == 0 || variant_count > self.config.max_variants {
            return Err(EngineError::InvalidInput(format!(
                "variantCount must be between 1 and {}, got {}",
                self.config.max_variants, variant_count
            )));
        }
        let departments = self.departments_for(request)?;
        (0..variant_count)
            .map(|variant| {
                self.generate_variant(request, &departments, variant, variant_count, &mut progress)
            })
            .collect()
    }

    fn departments_for(&self, request: &GenerateRequest) -> Result<Vec<DepartmentId>, EngineError> {
        match &request.departments {
            None => Ok(self.catalog.department_ids()),
            Some(subset) => {
                if let Some(unknown) = subset.iter().find(|&&d| !self.catalog.has_department(d)) {
                    return Err(EngineError::InvalidInput(format!("unknown department {unknown}")));
                }
                Ok(subset.iter().copied().sorted().dedup().collect())
            }
        }
    }

    fn generate_variant(
        &self,
        request: &GenerateRequest,
        departments: &[DepartmentId],
        variant: u32,
        variant_count: u32,
        progress: &mut impl FnMut(Progress),
    ) -> Result<Proposal, EngineError> {
        let start_time = Instant::now();
        info!(
            "Generating variant {}/{} for school year {} ({}) over {} departments...",
            variant + 1,
            variant_count,
            request.school_year_id,
            request.semester.as_str(),
            departments.len()
        );
        let mut run = Run::new(&self.catalog, self.config, variant);
        let mut proposals = BTreeMap::new();
        let mut failed = Vec::new();
        let mut summary = Summary::default();

        for (index, &department_id) in departments.iter().enumerate() {
            let pending = self
                .catalog
                .pending_for(department_id, request.school_year_id, request.semester)?;
            summary.total_assignments += pending.len();
            let strict = run.schedule_department(department_id, pending)?;
            summary.scheduled_strict += strict.schedules.len();
            failed.extend_from_slice(&strict.failures);
            proposals.insert(
                department_id,
                DepartmentProposal {
                    schedules: strict.schedules,
                    strict_failures: strict.failures,
                    warnings: strict.warnings,
                    ..DepartmentProposal::default()
                },
            );
            progress(Progress {
                variant,
                variant_count,
                department_index: index + 1,
                department_total: departments.len(),
                department_id,
            });
        }

        // one relaxation pass after every strict pass, so no department loses
        // a type-exact room to another department's fallback
        let relaxed = run.relax(&failed)?;
        summary.scheduled_relaxed = relaxed.placed.len();
        for placement in relaxed.placed {
            let department = proposals.entry(placement.department_id).or_default();
            department.relaxed.push(placement.schedule.assignment_id);
            department.schedules.push(placement.schedule);
            department.warnings.extend(placement.warning);
        }
        for &assignment_id in &relaxed.unscheduled {
            if let Some(assignment) = self.catalog.assignment(assignment_id) {
                proposals
                    .entry(assignment.department_id)
                    .or_default()
                    .unscheduled
                    .push(assignment_id);
            }
        }

        summary.total_scheduled = summary.scheduled_strict + summary.scheduled_relaxed;
        summary.unscheduled = relaxed.unscheduled.len();
        summary.warnings = proposals.values().map(|d| d.warnings.len()).sum();
        info!(
            "Variant {} done in {:.2?}: {} of {} scheduled ({} relaxed), {} unscheduled",
            variant + 1,
            start_time.elapsed(),
            summary.total_scheduled,
            summary.total_assignments,
            summary.scheduled_relaxed,
            summary.unscheduled
        );

        Ok(Proposal {
            school_year_id: request.school_year_id,
            semester: request.semester,
            variant,
            departments: proposals,
            unscheduled: relaxed.unscheduled,
            summary,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum DepartmentSaveStatus {
    Saved { count: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub saved_count: usize,
    pub per_department_status: BTreeMap<DepartmentId, DepartmentSaveStatus>,
}

impl SaveReport {
    pub fn failed_departments(&self) -> Vec<DepartmentId> {
        self.per_department_status
            .iter()
            .filter(|(_, status)| matches!(status, DepartmentSaveStatus::Failed { .. }))
            .map(|(&id, _)| id)
            .collect()
    }
}

/// Persists a proposal, one independent write per department.
///
/// A department that fails to save leaves the others untouched; the caller
/// may retry with just the failed ids.
pub fn save_proposal(
    store: &mut dyn TimetableStore,
    proposal: &Proposal,
    departments: Option<&[DepartmentId]>,
) -> SaveReport {
    let mut report = SaveReport::default();
    for (&department_id, department) in &proposal.departments {
        if departments.is_some_and(|subset| !subset.contains(&department_id)) {
            continue;
        }
        let saved = store.save_schedules(
            department_id,
            proposal.school_year_id,
            proposal.semester,
            &department.schedules,
        );
        let status = match saved {
            Ok(count) => {
                info!("Saved {} schedules for department {}", count, department_id);
                report.saved_count += count;
                DepartmentSaveStatus::Saved { count }
            }
            Err(e) => {
                error!("Saving department {} failed: {}", department_id, e);
                DepartmentSaveStatus::Failed { error: e.to_string() }
            }
        };
        report.per_department_status.insert(department_id, status);
    }
    report
}

/// Loads, generates and returns proposals in one call.
pub fn generate_from_store(
    store: &dyn TimetableStore,
    config: &EngineConfig,
    request: &GenerateRequest,
    progress: impl FnMut(Progress),
) -> Result<Vec<Proposal>, GenerateError> {
    let input = store.load_input(request.school_year_id, request.semester)?;
    let generator = Generator::new(&input, config)?;
    Ok(generator.generate(request, progress)?)
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Two schedules holding the same resource at overlapping times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ResourceKind,
    pub id: u32,
    pub first: AssignmentId,
    pub second: AssignmentId,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} is double-booked by assignments {} and {}",
            self.kind, self.id, self.first, self.second
        )
    }
}

/// Pairwise overlap check over rooms, professors and sections.
pub fn find_conflicts<'s>(
    schedules: impl IntoIterator<Item = &'s Schedule>,
    input: &TimetableInput,
) -> Vec<Conflict> {
    let professor_of: HashMap<AssignmentId, ProfessorId> = input
        .assignments
        .iter()
        .filter_map(|a| a.professor_id.map(|p| (a.id, p)))
        .collect();

    let mut by_resource: HashMap<(ResourceKind, u32), Vec<&Schedule>> = HashMap::new();
    for schedule in schedules {
        by_resource
            .entry((ResourceKind::Room, schedule.room_id))
            .or_default()
            .push(schedule);
        if let Some(&professor_id) = professor_of.get(&schedule.assignment_id) {
            by_resource
                .entry((ResourceKind::Professor, professor_id))
                .or_default()
                .push(schedule);
        }
        for &section_id in schedule.section_ids.iter().unique() {
            by_resource
                .entry((ResourceKind::Section, section_id))
                .or_default()
                .push(schedule);
        }
    }

    let mut conflicts = Vec::new();
    for ((kind, id), held) in by_resource {
        for (a, b) in held.iter().tuple_combinations() {
            if a.overlaps(b) {
                conflicts.push(Conflict {
                    kind,
                    id,
                    first: a.assignment_id.min(b.assignment_id),
                    second: a.assignment_id.max(b.assignment_id),
                });
            }
        }
    }
    if !conflicts.is_empty() {
        warn!("Found {} conflicting schedule pairs", conflicts.len());
    }
    conflicts.sort_by_key(|c| (c.kind as u8, c.id, c.first, c.second));
    conflicts
}
