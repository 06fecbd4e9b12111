pub mod availability;
pub mod directory;
pub mod supabase_store;

pub use availability::{validate_windows, AvailabilityStore, InMemoryAvailabilityStore};
pub use directory::{StaticTherapistDirectory, SupabaseTherapistDirectory, TherapistDirectory};
pub use supabase_store::SupabaseAvailabilityStore;
