// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_models::context::RequestContext;
use therapist_cell::models::{day_index, AvailabilityWindow};
use therapist_cell::services::{AvailabilityStore, TherapistDirectory};

use crate::models::{Appointment, AppointmentStatus, ConflictCheckResponse, SchedulingError};
use crate::services::store::AppointmentStore;

/// How far before a queried start an overlapping appointment can begin.
/// Bookings never cross local midnight, so no stored session is longer than
/// one local day, which is at most 25 hours. Independent of
/// `max_session_minutes`, which may have been higher when older sessions were
/// booked.
pub const OVERLAP_LOOKBACK_MINUTES: i64 = 25 * 60;

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`.
/// Touching endpoints do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Appointments that still hold time and overlap `[start, end)`.
pub fn find_conflicts<'a>(
    existing: &'a [Appointment],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_appointment_id: Option<Uuid>,
) -> Vec<&'a Appointment> {
    existing
        .iter()
        .filter(|a| Some(a.id) != exclude_appointment_id)
        .filter(|a| a.status.blocks_slot())
        .filter(|a| intervals_overlap(a.start_time, a.end_time(), start, end))
        .collect()
}

/// Whether `[start, end)` sits inside one active window once both ends are
/// read in the therapist's timezone. Intervals crossing local midnight are
/// never covered.
pub fn covered_by_availability(
    windows: &[AvailabilityWindow],
    tz: &Tz,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    let local_start = start.with_timezone(tz);
    let local_end = end.with_timezone(tz);

    if local_start.date_naive() != local_end.date_naive() {
        return false;
    }

    let day = day_index(local_start.weekday());
    windows
        .iter()
        .filter(|w| w.is_active && w.day_of_week == day)
        .any(|w| w.contains(local_start.time(), local_end.time()))
}

/// Read-only pre-flight check behind the conflicts endpoint. Holds no lock;
/// the answer may be stale by the time a booking is attempted.
pub struct ConflictDetectionService {
    availability: Arc<dyn AvailabilityStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn TherapistDirectory>,
    config: SchedulingConfig,
}

impl ConflictDetectionService {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn TherapistDirectory>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            availability,
            appointments,
            directory,
            config,
        }
    }

    pub async fn check_conflicts(
        &self,
        therapist_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        exclude_appointment_id: Option<Uuid>,
        ctx: &RequestContext,
    ) -> Result<ConflictCheckResponse, SchedulingError> {
        if duration_minutes <= 0 || duration_minutes > self.config.max_session_minutes {
            return Err(SchedulingError::validation(
                "duration_minutes",
                format!("must be between 1 and {}", self.config.max_session_minutes),
            ));
        }

        let end_time = start_time + Duration::minutes(duration_minutes);
        debug!(
            "Checking conflicts for therapist {} from {} to {}",
            therapist_id, start_time, end_time
        );

        let tz = self.directory.therapist_timezone(therapist_id, ctx).await?;
        let windows = self.availability.get_availability(therapist_id, ctx).await?;

        let existing = self
            .appointments
            .list_appointments(
                therapist_id,
                start_time - Duration::minutes(OVERLAP_LOOKBACK_MINUTES),
                end_time,
                Some(&AppointmentStatus::BLOCKING[..]),
                ctx,
            )
            .await?;

        let conflicting: Vec<Uuid> = find_conflicts(&existing, start_time, end_time, exclude_appointment_id)
            .into_iter()
            .map(|a| a.id)
            .collect();

        Ok(ConflictCheckResponse {
            has_conflict: !conflicting.is_empty(),
            within_availability: covered_by_availability(&windows, &tz, start_time, end_time),
            conflicting_appointments: conflicting,
        })
    }
}
