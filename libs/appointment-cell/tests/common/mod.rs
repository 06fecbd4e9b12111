#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentStatus, AuditRecord, BookAppointmentRequest, NewAppointment,
    SchedulingError, SessionStartEvent, StoreError,
};
use appointment_cell::services::{
    AppointmentStore, AuditSink, FixedClock, InMemoryAppointmentStore, SessionTracker,
};
use appointment_cell::{SchedulingDeps, SchedulingState};
use shared_config::AppConfig;
use shared_models::context::RequestContext;
use shared_utils::test_utils::{TestConfig, TestUser};
use therapist_cell::models::{AvailabilityError, AvailabilityWindow, WindowInput};
use therapist_cell::services::{AvailabilityStore, InMemoryAvailabilityStore, StaticTherapistDirectory};

/// 2030-03-04 is a Monday.
pub fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, 4, hour, minute, 0).unwrap()
}

pub fn window(day: i32, start: &str, end: &str) -> WindowInput {
    WindowInput {
        day_of_week: day,
        start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
        end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
        is_active: None,
    }
}

pub struct RecordingAuditSink {
    pub tx: mpsc::UnboundedSender<AuditRecord>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: &AuditRecord, _ctx: &RequestContext) -> Result<(), StoreError> {
        let _ = self.tx.send(record.clone());
        Ok(())
    }
}

pub struct RecordingSessionTracker {
    pub tx: mpsc::UnboundedSender<SessionStartEvent>,
}

#[async_trait]
impl SessionTracker for RecordingSessionTracker {
    async fn session_started(&self, event: &SessionStartEvent, _ctx: &RequestContext) -> Result<(), StoreError> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

pub struct FailingSessionTracker;

#[async_trait]
impl SessionTracker for FailingSessionTracker {
    async fn session_started(&self, _event: &SessionStartEvent, _ctx: &RequestContext) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("session service down".to_string()))
    }
}

/// Availability store whose reads can be slowed down or made to fail.
pub struct ScriptedAvailability {
    pub inner: InMemoryAvailabilityStore,
    pub delay: Option<std::time::Duration>,
    pub transient_failures: Mutex<u32>,
}

impl ScriptedAvailability {
    pub fn new() -> Self {
        Self {
            inner: InMemoryAvailabilityStore::new(),
            delay: None,
            transient_failures: Mutex::new(0),
        }
    }
}

#[async_trait]
impl AvailabilityStore for ScriptedAvailability {
    async fn set_availability(
        &self,
        therapist_id: Uuid,
        windows: Vec<WindowInput>,
        ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        self.inner.set_availability(therapist_id, windows, ctx).await
    }

    async fn list_windows(
        &self,
        therapist_id: Uuid,
        include_inactive: bool,
        ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.transient_failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(AvailabilityError::Unavailable("connection reset".to_string()));
            }
        }
        self.inner.list_windows(therapist_id, include_inactive, ctx).await
    }

    async fn set_window_active(
        &self,
        therapist_id: Uuid,
        window_id: Uuid,
        is_active: bool,
        ctx: &RequestContext,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        self.inner.set_window_active(therapist_id, window_id, is_active, ctx).await
    }
}

/// Appointment store that trusts its caller: inserts never re-check overlap
/// and range reads can be slowed down, like a remote database without an
/// exclusion constraint.
#[derive(Default)]
pub struct UncheckedAppointmentStore {
    appointments: Mutex<Vec<Appointment>>,
    pub read_delay: Option<std::time::Duration>,
}

impl UncheckedAppointmentStore {
    pub fn with_read_delay(delay: std::time::Duration) -> Self {
        Self {
            appointments: Mutex::new(Vec::new()),
            read_delay: Some(delay),
        }
    }

    async fn matching<F>(&self, statuses: Option<&[AppointmentStatus]>, keep: F) -> Vec<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        self.appointments
            .lock()
            .await
            .iter()
            .filter(|a| keep(a) && statuses.map_or(true, |s| s.contains(&a.status)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AppointmentStore for UncheckedAppointmentStore {
    async fn list_appointments(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        _ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self
            .matching(statuses, |a| a.therapist_id == therapist_id && start <= a.start_time && a.start_time < end)
            .await)
    }

    async fn list_client_appointments(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        _ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self
            .matching(statuses, |a| a.client_id == client_id && start <= a.start_time && a.start_time < end)
            .await)
    }

    async fn get_appointment(&self, appointment_id: Uuid, _ctx: &RequestContext) -> Result<Appointment, StoreError> {
        self.appointments
            .lock()
            .await
            .iter()
            .find(|a| a.id == appointment_id)
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
        self.appointments.lock().await.push(stored.clone());
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
        let mut appointments = self.appointments.lock().await;
        let appointment = appointments
            .iter_mut()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment_id)))?;
        if appointment.status != from {
            return Err(StoreError::Conflict(format!("appointment {} is {}", appointment_id, appointment.status)));
        }
        appointment.status = to;
        if notes.is_some() {
            appointment.notes = notes;
        }
        Ok(appointment.clone())
    }
}

pub struct Harness {
    pub test_config: TestConfig,
    pub config: Arc<AppConfig>,
    pub state: Arc<SchedulingState>,
    pub clock: Arc<FixedClock>,
    pub availability: Arc<ScriptedAvailability>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    /// The store the scheduling services actually use.
    pub store: Arc<dyn AppointmentStore>,
    pub directory: Arc<StaticTherapistDirectory>,
    pub therapist: TestUser,
    pub client: TestUser,
    pub audit_rx: mpsc::UnboundedReceiver<AuditRecord>,
    pub session_rx: mpsc::UnboundedReceiver<SessionStartEvent>,
}

pub struct HarnessBuilder {
    timezone: &'static str,
    availability: ScriptedAvailability,
    booking_timeout_ms: Option<u64>,
    failing_sessions: bool,
    store: Option<Arc<dyn AppointmentStore>>,
}

impl HarnessBuilder {
    pub fn timezone(mut self, timezone: &'static str) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn availability_delay(mut self, delay: std::time::Duration) -> Self {
        self.availability.delay = Some(delay);
        self
    }

    pub fn transient_availability_failures(mut self, count: u32) -> Self {
        self.availability.transient_failures = Mutex::new(count);
        self
    }

    pub fn booking_timeout_ms(mut self, ms: u64) -> Self {
        self.booking_timeout_ms = Some(ms);
        self
    }

    pub fn failing_sessions(mut self) -> Self {
        self.failing_sessions = true;
        self
    }

    /// Replace the in-memory appointment store.
    pub fn appointment_store(mut self, store: Arc<dyn AppointmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Therapist with Monday 09:00-12:00 in the chosen timezone; the clock
    /// reads the Friday before.
    pub async fn build(self) -> Harness {
        let test_config = TestConfig::default();
        let mut app_config = test_config.to_app_config();
        if let Some(ms) = self.booking_timeout_ms {
            app_config.scheduling.booking_timeout_ms = ms;
        }
        let config = Arc::new(app_config);

        let therapist = TestUser::therapist("ana@clinic.test");
        let client = TestUser::client("bia@clinic.test");

        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 3, 1, 8, 0, 0).unwrap()));
        let availability = Arc::new(self.availability);
        let appointments = Arc::new(InMemoryAppointmentStore::new());
        let store: Arc<dyn AppointmentStore> = match self.store {
            Some(store) => store,
            None => appointments.clone() as Arc<dyn AppointmentStore>,
        };
        let directory = Arc::new(StaticTherapistDirectory::new("UTC"));
        directory.register(therapist.uuid(), self.timezone).unwrap();

        let (audit_tx, audit_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let sessions: Arc<dyn SessionTracker> = if self.failing_sessions {
            Arc::new(FailingSessionTracker)
        } else {
            Arc::new(RecordingSessionTracker { tx: session_tx })
        };

        let deps = SchedulingDeps {
            availability: availability.clone(),
            appointments: store.clone(),
            directory: directory.clone(),
            audit: Arc::new(RecordingAuditSink { tx: audit_tx }),
            sessions,
            clock: clock.clone(),
        };
        let state = Arc::new(SchedulingState::new(config.clone(), deps));

        availability
            .inner
            .set_availability(therapist.uuid(), vec![window(1, "09:00", "12:00")], &therapist.context())
            .await
            .unwrap();

        Harness {
            test_config,
            config,
            state,
            clock,
            availability,
            appointments,
            store,
            directory,
            therapist,
            client,
            audit_rx,
            session_rx,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            timezone: "UTC",
            availability: ScriptedAvailability::new(),
            booking_timeout_ms: None,
            failing_sessions: false,
            store: None,
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub fn request(&self, start: DateTime<Utc>, minutes: i32) -> BookAppointmentRequest {
        BookAppointmentRequest {
            therapist_id: self.therapist.uuid(),
            client_id: self.client.uuid(),
            start_time: start.into(),
            duration_minutes: minutes,
            notes: None,
        }
    }

    pub async fn book(&self, start: DateTime<Utc>, minutes: i32) -> Result<Appointment, SchedulingError> {
        self.state
            .booking
            .validate_and_book(self.request(start, minutes), &self.client.context())
            .await
    }
}
