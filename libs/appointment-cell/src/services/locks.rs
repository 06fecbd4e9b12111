// libs/appointment-cell/src/services/locks.rs
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;
use uuid::Uuid;

/// Registry size at which idle entries are dropped on the next acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per therapist. Booking admission and status changes for
/// the same therapist run one at a time; different therapists never wait on
/// each other.
#[derive(Default)]
pub struct TherapistLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl TherapistLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, therapist_id: Uuid) -> OwnedMutexGuard<()> {
        if self.locks.len() >= PRUNE_THRESHOLD {
            self.prune();
        }

        // The shard guard must be released before awaiting.
        let lock = self
            .locks
            .entry(therapist_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        trace!("Waiting for scheduling lock of therapist {}", therapist_id);
        lock.lock_owned().await
    }

    /// Drop locks that no guard or waiter references. A pruned therapist
    /// gets a fresh mutex on its next acquire.
    pub fn prune(&self) {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        trace!("Pruned {} idle scheduling locks", before.saturating_sub(self.locks.len()));
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
