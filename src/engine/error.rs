use ulid::Ulid;

use crate::model::AppointmentStatus;
use crate::store::StoreError;
use crate::time::{Minutes, TimeError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("invalid {field}: {value} (out of range)")]
    InvalidDuration { field: &'static str, value: Minutes },
    #[error("{start} + {duration} minutes crosses midnight")]
    DurationOverflowsDay { start: String, duration: Minutes },
    #[error("invalid window: {start} is not before {end}")]
    InvalidWindow { start: String, end: String },
    #[error("slot {start}-{end} conflicts with appointment {appointment_id}")]
    SlotConflict {
        appointment_id: Ulid,
        start: String,
        end: String,
    },
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: Ulid },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("cancellation reason is required")]
    CancellationReasonRequired,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LimitExceeded(what) => EngineError::LimitExceeded(what),
            StoreError::InvalidDuration(value) => EngineError::InvalidDuration {
                field: "duration_minutes",
                value,
            },
            StoreError::DuplicateId(id) => EngineError::AlreadyExists {
                entity: "appointment",
                id,
            },
            other => EngineError::Store(other),
        }
    }
}

impl From<TimeError> for EngineError {
    fn from(e: TimeError) -> Self {
        match e {
            TimeError::InvalidTimeFormat(v) => EngineError::InvalidTimeFormat(v),
            TimeError::DurationOverflowsDay { start, delta } => {
                EngineError::DurationOverflowsDay { start, duration: delta }
            }
            TimeError::EmptyWindow { start, end } => EngineError::InvalidWindow { start, end },
        }
    }
}

impl EngineError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidTimeFormat(_) => "INVALID_TIME_FORMAT",
            EngineError::InvalidDuration { .. } => "INVALID_DURATION",
            EngineError::DurationOverflowsDay { .. } => "DURATION_OVERFLOWS_DAY",
            EngineError::InvalidWindow { .. } => "INVALID_WINDOW",
            EngineError::SlotConflict { .. } => "SLOT_CONFLICT",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::AlreadyExists { .. } => "ALREADY_EXISTS",
            EngineError::MissingField(_) => "MISSING_FIELD",
            EngineError::CancellationReasonRequired => "CANCELLATION_REASON_REQUIRED",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    /// HTTP-equivalent status code for an HTTP front end.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::InvalidTimeFormat(_)
            | EngineError::InvalidDuration { .. }
            | EngineError::DurationOverflowsDay { .. }
            | EngineError::InvalidWindow { .. }
            | EngineError::MissingField(_)
            | EngineError::CancellationReasonRequired => 400,
            EngineError::NotFound { .. } => 404,
            EngineError::SlotConflict { .. }
            | EngineError::InvalidTransition { .. }
            | EngineError::AlreadyExists { .. } => 409,
            EngineError::LimitExceeded(_) => 422,
            EngineError::Store(_) => 503,
        }
    }

    /// SQLSTATE reported on the Postgres wire.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::InvalidTimeFormat(_) => "22007",
            EngineError::InvalidDuration { .. }
            | EngineError::DurationOverflowsDay { .. }
            | EngineError::InvalidWindow { .. }
            | EngineError::CancellationReasonRequired => "22023",
            EngineError::SlotConflict { .. } => "23P01",
            EngineError::InvalidTransition { .. } => "55000",
            EngineError::NotFound { .. } => "P0002",
            EngineError::AlreadyExists { .. } => "23505",
            EngineError::MissingField(_) => "23502",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::Store(_) => "58000",
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: Ulid) -> Self {
        EngineError::NotFound { entity, id }
    }
}
