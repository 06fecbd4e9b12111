// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::context::RequestContext;

use crate::models::{
    Appointment, AppointmentStatus, AuditAction, AuditRecord, SchedulingError, SessionStartEvent,
    StoreError,
};
use crate::services::clock::Clock;
use crate::services::collaborators::{dispatch_audit, dispatch_session_start, AuditSink, SessionTracker};
use crate::services::locks::TherapistLocks;
use crate::services::store::AppointmentStore;

/// Allowed next states. Terminal states have none.
pub fn valid_transitions(current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current_status {
        AppointmentStatus::Scheduled => &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
        AppointmentStatus::Confirmed => &[AppointmentStatus::InProgress, AppointmentStatus::Cancelled],
        AppointmentStatus::InProgress => &[AppointmentStatus::Completed, AppointmentStatus::Cancelled],
        AppointmentStatus::Completed | AppointmentStatus::Cancelled => &[],
    }
}

pub fn validate_status_transition(
    current_status: AppointmentStatus,
    new_status: AppointmentStatus,
) -> Result<(), SchedulingError> {
    if valid_transitions(current_status).contains(&new_status) {
        Ok(())
    } else {
        warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
        Err(SchedulingError::InvalidTransition {
            from: current_status,
            to: new_status,
        })
    }
}

pub struct AppointmentLifecycleService {
    appointments: Arc<dyn AppointmentStore>,
    locks: Arc<TherapistLocks>,
    sessions: Arc<dyn SessionTracker>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AppointmentLifecycleService {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        locks: Arc<TherapistLocks>,
        sessions: Arc<dyn SessionTracker>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            appointments,
            locks,
            sessions,
            audit,
            clock,
        }
    }

    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        valid_transitions(current_status)
    }

    /// Move an appointment to `new_status`. The read, the legality check and
    /// the write happen under the therapist's lock.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        notes: Option<String>,
        ctx: &RequestContext,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Transitioning appointment {} to {}", appointment_id, new_status);

        let therapist_id = self.appointments.get_appointment(appointment_id, ctx).await?.therapist_id;
        let _guard = self.locks.acquire(therapist_id).await;

        let current = self.appointments.get_appointment(appointment_id, ctx).await?;
        validate_status_transition(current.status, new_status)?;

        let updated = match self
            .appointments
            .update_status(appointment_id, current.status, new_status, notes, ctx)
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::Conflict(msg)) => {
                // Another writer moved it first; report against what is stored now.
                warn!("Status of appointment {} changed concurrently: {}", appointment_id, msg);
                let latest = self.appointments.get_appointment(appointment_id, ctx).await?;
                return Err(SchedulingError::InvalidTransition {
                    from: latest.status,
                    to: new_status,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Appointment {} moved from {} to {}",
            appointment_id, current.status, updated.status
        );

        if updated.status == AppointmentStatus::InProgress {
            dispatch_session_start(
                self.sessions.clone(),
                SessionStartEvent {
                    appointment_id,
                    therapist_id: updated.therapist_id,
                    client_id: updated.client_id,
                    started_at: self.clock.now(),
                },
                ctx.clone(),
            );
        }

        dispatch_audit(
            self.audit.clone(),
            AuditRecord {
                appointment_id,
                actor_id: ctx.user.id.clone(),
                action: AuditAction::StatusChanged,
                from_status: Some(current.status),
                to_status: updated.status,
                at: self.clock.now(),
            },
            ctx.clone(),
        );

        Ok(updated)
    }
}
