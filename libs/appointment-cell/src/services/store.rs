// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::context::RequestContext;

use crate::models::{Appointment, AppointmentStatus, NewAppointment, StoreError};

/// Durable appointment records.
///
/// Range queries are half-open over start time: an appointment is returned
/// when `start <= start_time < end`. Callers that need every appointment
/// overlapping a window widen `start` by the longest session length.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_appointments(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn list_client_appointments(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Appointment, StoreError>;

    /// Persist a new appointment in `agendado`. Stores that can enforce
    /// non-overlap themselves report a collision as `StoreError::Conflict`.
    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        ctx: &RequestContext,
    ) -> Result<Appointment, StoreError>;

    /// Compare-and-set on status: succeeds only while the stored status is
    /// still `from`.
    async fn update_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        notes: Option<String>,
        ctx: &RequestContext,
    ) -> Result<Appointment, StoreError>;
}

fn matches_filter(appointment: &Appointment, statuses: Option<&[AppointmentStatus]>) -> bool {
    statuses.map_or(true, |allowed| allowed.contains(&appointment.status))
}

fn in_range(appointment: &Appointment, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    start <= appointment.start_time && appointment.start_time < end
}

/// Process-local store. Inserts re-check overlap against blocking
/// appointments under the write lock.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.appointments.read().await.len()
    }

    async fn collect<F>(&self, start: DateTime<Utc>, end: DateTime<Utc>, statuses: Option<&[AppointmentStatus]>, keep: F) -> Vec<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        let appointments = self.appointments.read().await;
        let mut found: Vec<Appointment> = appointments
            .values()
            .filter(|a| keep(a) && in_range(a, start, end) && matches_filter(a, statuses))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.start_time);
        found
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn list_appointments(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        _ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.collect(start, end, statuses, |a| a.therapist_id == therapist_id).await)
    }

    async fn list_client_appointments(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        _ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.collect(start, end, statuses, |a| a.client_id == client_id).await)
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        _ctx: &RequestContext,
    ) -> Result<Appointment, StoreError> {
        self.appointments
            .read()
            .await
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment_id)))
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        _ctx: &RequestContext,
    ) -> Result<Appointment, StoreError> {
        let now = Utc::now();
        let stored = Appointment {
            id: Uuid::new_v4(),
            therapist_id: appointment.therapist_id,
            client_id: appointment.client_id,
            start_time: appointment.start_time,
            duration_minutes: appointment.duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes: appointment.notes,
            created_at: now,
            updated_at: now,
        };

        let mut appointments = self.appointments.write().await;
        if let Some(existing) = appointments.values().find(|a| {
            a.therapist_id == stored.therapist_id
                && a.status.blocks_slot()
                && a.overlaps(stored.start_time, stored.end_time())
        }) {
            return Err(StoreError::Conflict(format!(
                "overlaps appointment {}",
                existing.id
            )));
        }

        debug!("Stored appointment {} for therapist {}", stored.id, stored.therapist_id);
        appointments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        notes: Option<String>,
        _ctx: &RequestContext,
    ) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&appointment_id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment_id)))?;

        if appointment.status != from {
            return Err(StoreError::Conflict(format!(
                "appointment {} is {} not {}",
                appointment_id, appointment.status, from
            )));
        }

        appointment.status = to;
        if notes.is_some() {
            appointment.notes = notes;
        }
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }
}
