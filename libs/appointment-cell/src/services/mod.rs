pub mod booking;
pub mod clock;
pub mod collaborators;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod slots;
pub mod store;
pub mod supabase_store;

pub use booking::BookingValidator;
pub use clock::{Clock, FixedClock, SystemClock};
pub use collaborators::{
    AuditSink, SessionTracker, SupabaseAuditSink, SupabaseSessionTracker, TracingAuditSink,
    TracingSessionTracker,
};
pub use conflict::{
    covered_by_availability, find_conflicts, intervals_overlap, ConflictDetectionService,
    OVERLAP_LOOKBACK_MINUTES,
};
pub use lifecycle::{valid_transitions, validate_status_transition, AppointmentLifecycleService};
pub use locks::TherapistLocks;
pub use slots::{SlotComputer, SlotIter, SlotPlan, MAX_GRANULARITY_MINUTES};
pub use store::{AppointmentStore, InMemoryAppointmentStore};
pub use supabase_store::SupabaseAppointmentStore;
