use crate::batch::{
    self, DepartmentResult, GenerateRequest, Generator, Progress, Proposal, SaveReport,
    find_conflicts,
};
use crate::config::{AppConfig, DataSource, EngineConfig};
use crate::data::{AssignmentId, DepartmentId, SchoolYearId, Semester, TimetableInput};
use crate::error::{EngineError, StoreError};
use crate::sqlite_store::SqliteStore;
use crate::store::{MemoryStore, TimetableStore};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

type ApiError = (StatusCode, String);

type SharedStore = Arc<Mutex<Box<dyn TimetableStore>>>;

/// Latest progress of the runs still in flight, keyed by the caller's run id.
///
/// An entry lives only while its run does; the finished result is the
/// response itself.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    runs: Arc<Mutex<HashMap<String, Progress>>>,
}

impl ProgressBoard {
    pub fn record(&self, run_id: &str, progress: Progress) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(run_id.to_string(), progress);
        }
    }

    pub fn get(&self, run_id: &str) -> Option<Progress> {
        self.runs.lock().ok()?.get(run_id).copied()
    }

    pub fn finish(&self, run_id: &str) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.remove(run_id);
        }
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct AppState {
    store: SharedStore,
    config: Arc<EngineConfig>,
    progress: ProgressBoard,
}

impl AppState {
    pub fn new(store: Box<dyn TimetableStore>, config: EngineConfig) -> Self {
        AppState {
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
            progress: ProgressBoard::default(),
        }
    }

    pub fn progress(&self) -> &ProgressBoard {
        &self.progress
    }

    fn load_input(
        &self,
        school_year_id: SchoolYearId,
        semester: Semester,
    ) -> Result<TimetableInput, ApiError> {
        let store = self.store.lock().map_err(|_| store_error(StoreError::Poisoned))?;
        store.load_input(school_year_id, semester).map_err(store_error)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TermRequest {
    school_year_id: SchoolYearId,
    semester: Semester,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    #[serde(flatten)]
    request: GenerateRequest,
    /// Key under which progress can be polled while the run is going.
    #[serde(default)]
    run_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub proposals: Vec<Proposal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveBody {
    proposal: Proposal,
    #[serde(default)]
    departments: Option<Vec<DepartmentId>>,
}

fn engine_error(e: EngineError) -> ApiError {
    let status = match e {
        EngineError::InvalidInput(_)
        | EngineError::UnknownReference { .. }
        | EngineError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn store_error(e: StoreError) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("background task failed: {e}"))
}

async fn generate_department_handler(
    State(state): State<AppState>,
    Path(department_id): Path<DepartmentId>,
    Json(term): Json<TermRequest>,
) -> Result<Json<DepartmentResult>, ApiError> {
    let input = state.load_input(term.school_year_id, term.semester)?;
    let config = state.config.clone();
    let result = tokio::task::spawn_blocking(move || {
        Generator::new(&input, &config)?.generate_for_department(
            department_id,
            term.school_year_id,
            term.semester,
        )
    })
    .await
    .map_err(join_error)?
    .map_err(engine_error)?;
    Ok(Json(result))
}

async fn generate_handler(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = body.request;
    let input = state.load_input(request.school_year_id, request.semester)?;
    let config = state.config.clone();
    let board = state.progress.clone();
    let run_id = body.run_id;
    let task_run_id = run_id.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        Generator::new(&input, &config)?.generate(&request, |p| {
            if let Some(run_id) = &task_run_id {
                board.record(run_id, p);
            }
        })
    })
    .await;
    if let Some(run_id) = &run_id {
        state.progress.finish(run_id);
    }
    let proposals = outcome.map_err(join_error)?.map_err(engine_error)?;
    Ok(Json(GenerateResponse { proposals }))
}

async fn progress_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Progress>, ApiError> {
    state.progress.get(&run_id).map(Json).ok_or_else(|| {
        (StatusCode::NOT_FOUND, format!("no run in progress under '{run_id}'"))
    })
}

async fn save_handler(
    State(state): State<AppState>,
    Json(body): Json<SaveBody>,
) -> Result<Json<SaveReport>, ApiError> {
    let store = state.store.clone();
    let report = tokio::task::spawn_blocking(move || {
        save_checked(&store, &body.proposal, body.departments.as_deref())
    })
    .await
    .map_err(join_error)??;
    Ok(Json(report))
}

/// Saves the selected departments once they are shown not to clash with what
/// is already saved for the term. Holds the store lock across check and write.
fn save_checked(
    store: &SharedStore,
    proposal: &Proposal,
    departments: Option<&[DepartmentId]>,
) -> Result<SaveReport, ApiError> {
    let mut store = store.lock().map_err(|_| store_error(StoreError::Poisoned))?;
    let input = store
        .load_input(proposal.school_year_id, proposal.semester)
        .map_err(store_error)?;

    let already_saved: HashSet<AssignmentId> =
        input.existing_schedules.iter().map(|s| s.assignment_id).collect();
    if let Some(repeat) = proposal
        .schedules_in(departments)
        .find(|s| already_saved.contains(&s.assignment_id))
    {
        warn!("Rejecting proposal: assignment {} is already saved", repeat.assignment_id);
        return Err((
            StatusCode::CONFLICT,
            format!("assignment {} is already saved for this term", repeat.assignment_id),
        ));
    }

    // a proposal may be stale or edited by the caller; check it against what is saved now
    let incoming = proposal.schedules_in(departments);
    let conflicts = find_conflicts(input.existing_schedules.iter().chain(incoming), &input);
    if let Some(first) = conflicts.first() {
        warn!("Rejecting proposal with {} conflicts", conflicts.len());
        return Err((
            StatusCode::CONFLICT,
            format!(
                "proposal conflicts with saved schedules: {first} (and {} more)",
                conflicts.len() - 1
            ),
        ));
    }
    Ok(batch::save_proposal(&mut **store, proposal, departments))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/timetable/departments/:department_id/generate",
            post(generate_department_handler),
        )
        .route("/v1/timetable/generate", post(generate_handler))
        .route("/v1/timetable/save", post(save_handler))
        .route("/v1/timetable/progress/:run_id", get(progress_handler))
        .with_state(state)
}

pub fn open_store(source: &DataSource) -> Result<Box<dyn TimetableStore>, StoreError> {
    let store: Box<dyn TimetableStore> = match source {
        DataSource::Sqlite { path } => Box::new(SqliteStore::open(path)?),
        DataSource::Seed { path: Some(path) } => Box::new(MemoryStore::from_json_file(path)?),
        DataSource::Seed { path: None } => {
            warn!("No data source configured, starting with an empty in-memory store");
            Box::new(MemoryStore::default())
        }
    };
    Ok(store)
}

pub async fn run_server(config: AppConfig) -> Result<(), String> {
    let store = open_store(&config.data).map_err(|e| e.to_string())?;
    let app = router(AppState::new(store, config.engine));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| format!("cannot bind {}: {}", config.server.bind, e))?;

    match listener.local_addr() {
        Ok(addr) => info!("Server running at http://{}", addr),
        Err(_) => info!("Server running at http://{}", config.server.bind),
    }

    axum::serve(listener, app).await.map_err(|e| e.to_string())
}
