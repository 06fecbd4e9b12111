// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use therapist_cell::models::AvailabilityError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub client_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }

    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time()
    }
}

/// Appointment lifecycle states. Wire values are the clinic's Portuguese
/// status names; the English spellings are accepted on input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    #[serde(rename = "agendado", alias = "scheduled")]
    Scheduled,
    #[serde(rename = "confirmado", alias = "confirmed")]
    Confirmed,
    #[serde(rename = "em_andamento", alias = "in_progress")]
    InProgress,
    #[serde(rename = "realizado", alias = "completed")]
    Completed,
    #[serde(rename = "cancelado", alias = "cancelled")]
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    /// Statuses whose interval still holds the therapist's time for
    /// admission control.
    pub const BLOCKING: [AppointmentStatus; 3] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
    ];

    /// Everything but cancelled; what the slot view treats as busy.
    pub const NOT_CANCELLED: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "agendado",
            AppointmentStatus::Confirmed => "confirmado",
            AppointmentStatus::InProgress => "em_andamento",
            AppointmentStatus::Completed => "realizado",
            AppointmentStatus::Cancelled => "cancelado",
        }
    }

    pub fn blocks_slot(&self) -> bool {
        Self::BLOCKING.contains(self)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "agendado" | "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmado" | "confirmed" => Ok(AppointmentStatus::Confirmed),
            "em_andamento" | "in_progress" => Ok(AppointmentStatus::InProgress),
            "realizado" | "completed" => Ok(AppointmentStatus::Completed),
            "cancelado" | "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(SchedulingError::validation(
                "status",
                format!("unknown appointment status '{}'", other),
            )),
        }
    }
}

/// Parse a comma separated status filter such as `agendado,confirmado`.
pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<Vec<AppointmentStatus>>, SchedulingError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(list) => list
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
    }
}

/// Row handed to the store once admission control has accepted a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub therapist_id: Uuid,
    pub client_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    #[serde(alias = "therapistId")]
    pub therapist_id: Uuid,
    #[serde(alias = "clientId")]
    pub client_id: Uuid,
    /// ISO-8601 with an explicit offset.
    #[serde(alias = "startTime")]
    pub start_time: DateTime<FixedOffset>,
    #[serde(alias = "durationMinutes")]
    pub duration_minutes: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl BookAppointmentRequest {
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start_time.with_timezone(&Utc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentRangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub granularity_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub within_availability: bool,
    pub conflicting_appointments: Vec<Uuid>,
}

// ==============================================================================
// COLLABORATOR EVENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStartEvent {
    pub appointment_id: Uuid,
    pub therapist_id: Uuid,
    pub client_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Booked,
    StatusChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub appointment_id: Uuid,
    pub actor_id: String,
    pub action: AuditAction,
    pub from_status: Option<AppointmentStatus>,
    pub to_status: AppointmentStatus,
    pub at: DateTime<Utc>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Failures reported by an appointment store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The write collided with a concurrent one (exclusion constraint,
    /// serialization abort, or stale status).
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => StoreError::NotFound(msg),
            DatabaseError::Conflict(msg) => StoreError::Conflict(msg),
            e if e.is_transient() => StoreError::Unavailable(e.to_string()),
            e => StoreError::Backend(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Therapist {therapist_id} has no availability covering {start_time}")]
    OutsideAvailability {
        therapist_id: Uuid,
        start_time: DateTime<Utc>,
    },

    #[error("Requested slot overlaps existing appointments {conflicting:?}")]
    SlotConflict { conflicting: Vec<Uuid> },

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Booking did not complete within {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Availability(AvailabilityError),

    #[error(transparent)]
    Store(StoreError),
}

impl SchedulingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            SchedulingError::Availability(e) => e.is_transient(),
            SchedulingError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for SchedulingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => SchedulingError::NotFound(msg),
            other => SchedulingError::Store(other),
        }
    }
}

impl From<AvailabilityError> for SchedulingError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Validation { field, message } => SchedulingError::Validation { field, message },
            AvailabilityError::NotFound(msg) => SchedulingError::NotFound(msg),
            AvailabilityError::Forbidden(msg) => SchedulingError::Forbidden(msg),
            other => SchedulingError::Availability(other),
        }
    }
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Validation { field, message } => AppError::validation(field, message),
            e @ SchedulingError::OutsideAvailability { .. } => AppError::OutsideAvailability(e.to_string()),
            e @ SchedulingError::SlotConflict { .. } => AppError::SlotConflict(e.to_string()),
            e @ SchedulingError::InvalidTransition { .. } => AppError::InvalidTransition(e.to_string()),
            SchedulingError::NotFound(msg) => AppError::NotFound(msg),
            SchedulingError::Forbidden(msg) => AppError::Forbidden(msg),
            e @ SchedulingError::Timeout(_) => AppError::Unavailable(e.to_string()),
            SchedulingError::Availability(e) => AppError::from(e),
            SchedulingError::Store(StoreError::Unavailable(msg)) => AppError::Unavailable(msg),
            SchedulingError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
