use crate::data::{AssignmentId, Day, Hour};
use crate::occupancy::ResourceKind;
use thiserror::Error;

/// Errors that abort a generation run.
///
/// Placement failures and load overloads are reported as data in the
/// results; everything here is either bad input or a broken invariant
/// between the candidate generator and the scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{kind} {id} is already busy on {day} {start:02}:00-{end:02}:00")]
    SlotOccupied {
        kind: ResourceKind,
        id: u32,
        day: Day,
        start: Hour,
        end: Hour,
    },

    #[error("{kind} {id} holds no reservation on {day} {start:02}:00-{end:02}:00")]
    NotReserved {
        kind: ResourceKind,
        id: u32,
        day: Day,
        start: Hour,
        end: Hour,
    },

    #[error("slot {day} {start:02}:00-{end:02}:00 lies outside operating hours {open:02}:00-{close:02}:00")]
    OutsideOperatingHours {
        day: Day,
        start: Hour,
        end: Hour,
        open: Hour,
        close: Hour,
    },

    #[error("assignment {assignment_id} references unknown {entity} {id}")]
    UnknownReference {
        assignment_id: AssignmentId,
        entity: &'static str,
        id: u32,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the data access boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store rejected write: {0}")]
    Rejected(String),

    #[error("store lock poisoned")]
    Poisoned,
}
