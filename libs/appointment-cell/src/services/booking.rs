// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};

use shared_config::SchedulingConfig;
use shared_models::context::RequestContext;
use therapist_cell::services::{AvailabilityStore, TherapistDirectory};

use crate::models::{
    Appointment, AppointmentStatus, AuditAction, AuditRecord, BookAppointmentRequest,
    NewAppointment, SchedulingError, StoreError,
};
use crate::services::clock::Clock;
use crate::services::collaborators::{dispatch_audit, AuditSink};
use crate::services::conflict::{covered_by_availability, find_conflicts, OVERLAP_LOOKBACK_MINUTES};
use crate::services::locks::TherapistLocks;
use crate::services::store::AppointmentStore;

/// Admission control for new appointments. This is the only path that
/// inserts into the appointment store.
pub struct BookingValidator {
    availability: Arc<dyn AvailabilityStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn TherapistDirectory>,
    locks: Arc<TherapistLocks>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    config: SchedulingConfig,
}

/// An accepted request, still holding the therapist's lock.
struct Admission {
    guard: OwnedMutexGuard<()>,
    appointment: NewAppointment,
}

impl BookingValidator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn TherapistDirectory>,
        locks: Arc<TherapistLocks>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            availability,
            appointments,
            directory,
            locks,
            clock,
            audit,
            config,
        }
    }

    /// Validate a booking request and, if it is admissible, persist it in
    /// `agendado`.
    ///
    /// Checks run in order: request shape, availability containment in the
    /// therapist's local time, then overlap with active appointments. The
    /// overlap check and the insert happen under the therapist's lock, so two
    /// overlapping requests for one therapist can never both be stored.
    ///
    /// Everything up to the insert is bounded by `booking_timeout_ms`. When
    /// the budget runs out nothing has been written and `Timeout` is
    /// returned. The insert itself is not retried.
    #[instrument(
        skip(self, request, ctx),
        fields(therapist_id = %request.therapist_id, client_id = %request.client_id)
    )]
    pub async fn validate_and_book(
        &self,
        request: BookAppointmentRequest,
        ctx: &RequestContext,
    ) -> Result<Appointment, SchedulingError> {
        let budget = std::time::Duration::from_millis(self.config.booking_timeout_ms);

        let Admission { guard, appointment } = match tokio::time::timeout(budget, self.admit(&request, ctx)).await {
            Ok(admission) => admission?,
            Err(_) => {
                warn!("Booking admission exceeded {} ms", self.config.booking_timeout_ms);
                return Err(SchedulingError::Timeout(self.config.booking_timeout_ms));
            }
        };

        let stored = self
            .appointments
            .insert_appointment(appointment, ctx)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(msg) => {
                    warn!("Store rejected overlapping booking: {}", msg);
                    SchedulingError::SlotConflict { conflicting: Vec::new() }
                }
                other => SchedulingError::from(other),
            })?;
        drop(guard);

        info!(
            "Booked appointment {} at {} for {} min",
            stored.id, stored.start_time, stored.duration_minutes
        );

        dispatch_audit(
            self.audit.clone(),
            AuditRecord {
                appointment_id: stored.id,
                actor_id: ctx.user.id.clone(),
                action: AuditAction::Booked,
                from_status: None,
                to_status: stored.status,
                at: self.clock.now(),
            },
            ctx.clone(),
        );

        Ok(stored)
    }

    fn validate_request(&self, request: &BookAppointmentRequest) -> Result<(DateTime<Utc>, DateTime<Utc>), SchedulingError> {
        let minutes = request.duration_minutes as i64;
        if minutes <= 0 {
            return Err(SchedulingError::validation("duration_minutes", "must be positive"));
        }
        if minutes > self.config.max_session_minutes {
            return Err(SchedulingError::validation(
                "duration_minutes",
                format!("must not exceed {} minutes", self.config.max_session_minutes),
            ));
        }

        let start = request.start_utc();
        if start < self.clock.now() {
            return Err(SchedulingError::validation("start_time", "must not be in the past"));
        }

        Ok((start, start + Duration::minutes(minutes)))
    }

    async fn admit(
        &self,
        request: &BookAppointmentRequest,
        ctx: &RequestContext,
    ) -> Result<Admission, SchedulingError> {
        let (start, end) = self.validate_request(request)?;
        let therapist_id = request.therapist_id;

        let tz = self.directory.therapist_timezone(therapist_id, ctx).await?;
        let windows = self.availability.get_availability(therapist_id, ctx).await?;
        if !covered_by_availability(&windows, &tz, start, end) {
            debug!("{} - {} is outside the availability of {}", start, end, therapist_id);
            return Err(SchedulingError::OutsideAvailability {
                therapist_id,
                start_time: start,
            });
        }

        let guard = self.locks.acquire(therapist_id).await;

        let existing = self
            .appointments
            .list_appointments(
                therapist_id,
                start - Duration::minutes(OVERLAP_LOOKBACK_MINUTES),
                end,
                Some(&AppointmentStatus::BLOCKING[..]),
                ctx,
            )
            .await?;

        let conflicting: Vec<_> = find_conflicts(&existing, start, end, None)
            .into_iter()
            .map(|a| a.id)
            .collect();
        if !conflicting.is_empty() {
            warn!("Booking for therapist {} at {} overlaps {:?}", therapist_id, start, conflicting);
            return Err(SchedulingError::SlotConflict { conflicting });
        }

        Ok(Admission {
            guard,
            appointment: NewAppointment {
                therapist_id,
                client_id: request.client_id,
                start_time: start,
                duration_minutes: request.duration_minutes,
                notes: request.notes.clone(),
            },
        })
    }
}
