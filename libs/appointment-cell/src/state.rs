// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use shared_config::{AppConfig, StoreBackend};
use shared_database::supabase::SupabaseClient;
use therapist_cell::services::{
    AvailabilityStore, InMemoryAvailabilityStore, StaticTherapistDirectory, SupabaseAvailabilityStore,
    SupabaseTherapistDirectory, TherapistDirectory,
};

use crate::services::{
    AppointmentLifecycleService, AppointmentStore, AuditSink, BookingValidator, Clock,
    ConflictDetectionService, InMemoryAppointmentStore, SessionTracker, SlotComputer,
    SupabaseAppointmentStore, SupabaseAuditSink, SupabaseSessionTracker, SystemClock, TherapistLocks,
    TracingAuditSink, TracingSessionTracker,
};

/// The stores and collaborators the scheduling services are built from.
#[derive(Clone)]
pub struct SchedulingDeps {
    pub availability: Arc<dyn AvailabilityStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub directory: Arc<dyn TherapistDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub sessions: Arc<dyn SessionTracker>,
    pub clock: Arc<dyn Clock>,
}

impl SchedulingDeps {
    /// Process-local stores; unknown therapists resolve to the default timezone.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            availability: Arc::new(InMemoryAvailabilityStore::new()),
            appointments: Arc::new(InMemoryAppointmentStore::new()),
            directory: Arc::new(StaticTherapistDirectory::permissive(
                config.scheduling.default_timezone.clone(),
            )),
            audit: Arc::new(TracingAuditSink),
            sessions: Arc::new(TracingSessionTracker),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn supabase(config: &AppConfig) -> Self {
        let client = Arc::new(SupabaseClient::new(config));
        Self {
            availability: Arc::new(SupabaseAvailabilityStore::with_client(client.clone())),
            appointments: Arc::new(SupabaseAppointmentStore::with_client(client.clone())),
            directory: Arc::new(SupabaseTherapistDirectory::with_client(
                client.clone(),
                config.scheduling.default_timezone.clone(),
            )),
            audit: Arc::new(SupabaseAuditSink::new(client.clone())),
            sessions: Arc::new(SupabaseSessionTracker::new(client)),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        match config.store_backend {
            StoreBackend::Memory => Self::in_memory(config),
            StoreBackend::Supabase => Self::supabase(config),
        }
    }
}

/// Shared state behind the appointment routes.
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub availability: Arc<dyn AvailabilityStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub booking: BookingValidator,
    pub slots: SlotComputer,
    pub lifecycle: AppointmentLifecycleService,
    pub conflicts: ConflictDetectionService,
}

impl SchedulingState {
    pub fn new(config: Arc<AppConfig>, deps: SchedulingDeps) -> Self {
        let scheduling = config.scheduling.clone();
        let locks = Arc::new(TherapistLocks::new());

        let booking = BookingValidator::new(
            deps.availability.clone(),
            deps.appointments.clone(),
            deps.directory.clone(),
            locks.clone(),
            deps.clock.clone(),
            deps.audit.clone(),
            scheduling.clone(),
        );
        let slots = SlotComputer::new(
            deps.availability.clone(),
            deps.appointments.clone(),
            deps.directory.clone(),
            deps.clock.clone(),
            scheduling.clone(),
        );
        let lifecycle = AppointmentLifecycleService::new(
            deps.appointments.clone(),
            locks,
            deps.sessions.clone(),
            deps.audit.clone(),
            deps.clock.clone(),
        );
        let conflicts = ConflictDetectionService::new(
            deps.availability.clone(),
            deps.appointments.clone(),
            deps.directory.clone(),
            scheduling,
        );

        Self {
            config,
            availability: deps.availability,
            appointments: deps.appointments,
            booking,
            slots,
            lifecycle,
            conflicts,
        }
    }

    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let deps = SchedulingDeps::from_config(&config);
        Self::new(config, deps)
    }
}
