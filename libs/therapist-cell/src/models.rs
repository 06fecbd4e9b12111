// libs/therapist-cell/src/models.rs
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// A recurring weekly interval during which a therapist takes appointments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityWindow {
    pub fn from_input(therapist_id: Uuid, input: &WindowInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            therapist_id,
            day_of_week: input.day_of_week,
            start_time: input.start_time,
            end_time: input.end_time,
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `[start, end)` on this window's weekday lies entirely inside it.
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time <= start && end <= self.end_time && start < end
    }
}

/// A window as submitted by the therapist, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInput {
    #[serde(alias = "dayOfWeek")]
    pub day_of_week: i32,
    #[serde(with = "time_of_day", alias = "startTime")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day", alias = "endTime")]
    pub end_time: NaiveTime,
    #[serde(default, alias = "isActive")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAvailabilityRequest {
    pub windows: Vec<WindowInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWindowRequest {
    #[serde(alias = "isActive")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Sunday-based day index used throughout the availability tables.
pub fn day_index(weekday: Weekday) -> i32 {
    weekday.num_days_from_sunday() as i32
}

// ==============================================================================
// DIRECTORY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistProfile {
    pub id: Uuid,
    pub timezone: Option<String>,
}

impl TherapistProfile {
    pub fn tz(&self, fallback: &str) -> Result<Tz, AvailabilityError> {
        let name = self.timezone.as_deref().unwrap_or(fallback);
        parse_timezone(name)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, AvailabilityError> {
    name.parse::<Tz>()
        .map_err(|_| AvailabilityError::InvalidTimezone(name.to_string()))
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("Availability store unavailable: {0}")]
    Unavailable(String),

    #[error("Availability store error: {0}")]
    Store(String),
}

impl AvailabilityError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AvailabilityError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AvailabilityError::Unavailable(_))
    }
}

impl From<DatabaseError> for AvailabilityError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => AvailabilityError::NotFound(msg),
            e if e.is_transient() => AvailabilityError::Unavailable(e.to_string()),
            e => AvailabilityError::Store(e.to_string()),
        }
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Validation { field, message } => AppError::validation(field, message),
            AvailabilityError::NotFound(msg) => AppError::NotFound(msg),
            AvailabilityError::Forbidden(msg) => AppError::Forbidden(msg),
            AvailabilityError::InvalidTimezone(name) => {
                AppError::Internal(format!("Unknown timezone '{}'", name))
            }
            AvailabilityError::Unavailable(msg) => AppError::Unavailable(msg),
            AvailabilityError::Store(msg) => AppError::Database(msg),
        }
    }
}

/// `HH:MM[:SS]` time-of-day, as stored in Postgres `time` columns.
pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
            .map_err(|_| D::Error::custom(format!("invalid time of day '{}'", raw)))
    }
}
