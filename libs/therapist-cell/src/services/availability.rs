// libs/therapist-cell/src/services/availability.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::context::RequestContext;

use crate::models::{AvailabilityError, AvailabilityWindow, WindowInput};

/// Persistence for a therapist's recurring weekly availability.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Replace every window of the therapist with `windows` in one atomic
    /// step. Readers observe either the old set or the new one.
    async fn set_availability(
        &self,
        therapist_id: Uuid,
        windows: Vec<WindowInput>,
        ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError>;

    async fn list_windows(
        &self,
        therapist_id: Uuid,
        include_inactive: bool,
        ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError>;

    async fn set_window_active(
        &self,
        therapist_id: Uuid,
        window_id: Uuid,
        is_active: bool,
        ctx: &RequestContext,
    ) -> Result<AvailabilityWindow, AvailabilityError>;

    /// Active windows ordered by day of week, then start time.
    async fn get_availability(
        &self,
        therapist_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        self.list_windows(therapist_id, false, ctx).await
    }
}

/// Check a full replacement set before it is written.
///
/// Every window must satisfy `start < end` and `0 <= day_of_week <= 6`, and no
/// two windows on the same day may overlap. Windows that merely touch
/// (one ends when the next starts) are fine.
pub fn validate_windows(windows: &[WindowInput]) -> Result<(), AvailabilityError> {
    for (idx, window) in windows.iter().enumerate() {
        if !(0..=6).contains(&window.day_of_week) {
            return Err(AvailabilityError::validation(
                format!("windows[{}].day_of_week", idx),
                "Day of week must be between 0 (Sunday) and 6 (Saturday)",
            ));
        }
        if window.start_time >= window.end_time {
            return Err(AvailabilityError::validation(
                format!("windows[{}].end_time", idx),
                "Start time must be before end time",
            ));
        }
    }

    let mut ordered: Vec<(usize, &WindowInput)> = windows.iter().enumerate().collect();
    ordered.sort_by_key(|(_, w)| (w.day_of_week, w.start_time));

    for pair in ordered.windows(2) {
        let (prev_idx, prev) = pair[0];
        let (idx, current) = pair[1];
        if prev.day_of_week == current.day_of_week && current.start_time < prev.end_time {
            warn!(
                "Overlapping availability windows on day {}: {}-{} and {}-{}",
                current.day_of_week, prev.start_time, prev.end_time, current.start_time, current.end_time
            );
            return Err(AvailabilityError::validation(
                format!("windows[{}]", idx),
                format!(
                    "Window overlaps windows[{}] on day {} ({}-{})",
                    prev_idx, current.day_of_week, prev.start_time, prev.end_time
                ),
            ));
        }
    }

    Ok(())
}

pub(crate) fn sort_windows(windows: &mut [AvailabilityWindow]) {
    windows.sort_by_key(|w| (w.day_of_week, w.start_time));
}

/// Process-local store. The whole replace happens under one write guard.
#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    windows: RwLock<HashMap<Uuid, Vec<AvailabilityWindow>>>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn set_availability(
        &self,
        therapist_id: Uuid,
        windows: Vec<WindowInput>,
        _ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!("Replacing availability for therapist {} with {} windows", therapist_id, windows.len());
        validate_windows(&windows)?;

        let now = Utc::now();
        let mut stored: Vec<AvailabilityWindow> = windows
            .iter()
            .map(|input| AvailabilityWindow::from_input(therapist_id, input, now))
            .collect();
        sort_windows(&mut stored);

        self.windows.write().await.insert(therapist_id, stored.clone());

        info!("Availability replaced for therapist {} ({} windows)", therapist_id, stored.len());
        Ok(stored)
    }

    async fn list_windows(
        &self,
        therapist_id: Uuid,
        include_inactive: bool,
        _ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let guard = self.windows.read().await;
        Ok(guard
            .get(&therapist_id)
            .map(|windows| {
                windows
                    .iter()
                    .filter(|w| include_inactive || w.is_active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_window_active(
        &self,
        therapist_id: Uuid,
        window_id: Uuid,
        is_active: bool,
        _ctx: &RequestContext,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        let mut guard = self.windows.write().await;
        let window = guard
            .get_mut(&therapist_id)
            .and_then(|windows| windows.iter_mut().find(|w| w.id == window_id))
            .ok_or_else(|| AvailabilityError::NotFound(format!("availability window {}", window_id)))?;

        window.is_active = is_active;
        window.updated_at = Utc::now();

        info!("Window {} of therapist {} set active={}", window_id, therapist_id, is_active);
        Ok(window.clone())
    }
}
