// libs/appointment-cell/src/services/slots.rs
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_models::context::RequestContext;
use therapist_cell::models::{day_index, AvailabilityWindow};
use therapist_cell::services::{AvailabilityStore, TherapistDirectory};

use crate::models::{AppointmentStatus, SchedulingError, Slot};
use crate::services::clock::Clock;
use crate::services::conflict::{intervals_overlap, OVERLAP_LOOKBACK_MINUTES};
use crate::services::store::AppointmentStore;

/// Largest accepted step between candidate starts: one day.
pub const MAX_GRANULARITY_MINUTES: i64 = 24 * 60;

/// Run a read, and run it once more if the first failure was transient.
async fn read_with_retry<T, F, Fut>(what: &str, op: F) -> Result<T, SchedulingError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SchedulingError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            warn!("Transient failure reading {}, retrying once: {}", what, e);
            op().await
        }
        other => other,
    }
}

/// Read-side expansion of weekly availability into concrete free slots.
pub struct SlotComputer {
    availability: Arc<dyn AvailabilityStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn TherapistDirectory>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
}

impl SlotComputer {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn TherapistDirectory>,
        clock: Arc<dyn Clock>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            availability,
            appointments,
            directory,
            clock,
            config,
        }
    }

    /// Gather everything needed to enumerate free slots in
    /// `[range_start, range_end)`. `None` falls back to the configured
    /// session length and step.
    pub async fn compute(
        &self,
        therapist_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        duration_minutes: Option<i64>,
        granularity_minutes: Option<i64>,
        ctx: &RequestContext,
    ) -> Result<SlotPlan, SchedulingError> {
        let duration_minutes = duration_minutes.unwrap_or(self.config.default_session_minutes);
        let granularity_minutes = granularity_minutes.unwrap_or(self.config.slot_granularity_minutes);

        if range_end <= range_start {
            return Err(SchedulingError::validation("end", "must be after start"));
        }
        if range_end - range_start > Duration::days(self.config.max_slot_range_days) {
            return Err(SchedulingError::validation(
                "end",
                format!("range may span at most {} days", self.config.max_slot_range_days),
            ));
        }
        if duration_minutes <= 0 || duration_minutes > self.config.max_session_minutes {
            return Err(SchedulingError::validation(
                "duration_minutes",
                format!("must be between 1 and {}", self.config.max_session_minutes),
            ));
        }
        if !(1..=MAX_GRANULARITY_MINUTES).contains(&granularity_minutes) {
            return Err(SchedulingError::validation(
                "granularity_minutes",
                format!("must be between 1 and {}", MAX_GRANULARITY_MINUTES),
            ));
        }

        debug!(
            "Computing slots for therapist {} from {} to {} ({} min every {} min)",
            therapist_id, range_start, range_end, duration_minutes, granularity_minutes
        );

        let duration = Duration::minutes(duration_minutes);
        let tz = read_with_retry("therapist timezone", || async {
            Ok::<_, SchedulingError>(self.directory.therapist_timezone(therapist_id, ctx).await?)
        })
        .await?;

        let mut windows = read_with_retry("availability", || async {
            Ok::<_, SchedulingError>(self.availability.get_availability(therapist_id, ctx).await?)
        })
        .await?;
        windows.retain(|w| w.is_active);
        windows.sort_by_key(|w| (w.day_of_week, w.start_time));

        let lookup_start = range_start - Duration::minutes(OVERLAP_LOOKBACK_MINUTES);
        let lookup_end = range_end + duration;
        let appointments = read_with_retry("appointments", || async {
            Ok::<_, SchedulingError>(self
                .appointments
                .list_appointments(
                    therapist_id,
                    lookup_start,
                    lookup_end,
                    Some(&AppointmentStatus::NOT_CANCELLED[..]),
                    ctx,
                )
                .await?)
        })
        .await?;

        let mut busy: Vec<(DateTime<Utc>, DateTime<Utc>)> = appointments
            .iter()
            .map(|a| (a.start_time, a.end_time()))
            .collect();
        busy.sort();

        Ok(SlotPlan {
            therapist_id,
            tz,
            first_day: range_start.with_timezone(&tz).date_naive(),
            last_day: range_end.with_timezone(&tz).date_naive(),
            windows,
            busy,
            range_start,
            range_end,
            not_before: self.clock.now(),
            duration,
            granularity: Duration::minutes(granularity_minutes),
        })
    }
}

/// A snapshot of one therapist's availability and bookings over a range.
/// Iterating never touches a store.
#[derive(Debug, Clone)]
pub struct SlotPlan {
    pub therapist_id: Uuid,
    tz: Tz,
    first_day: NaiveDate,
    last_day: NaiveDate,
    windows: Vec<AvailabilityWindow>,
    busy: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    not_before: DateTime<Utc>,
    duration: Duration,
    granularity: Duration,
}

impl SlotPlan {
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// A fresh iterator from the beginning of the range.
    pub fn iter(&self) -> SlotIter<'_> {
        SlotIter {
            plan: self,
            day: Some(self.first_day),
            window: 0,
            cursor: None,
        }
    }

    fn is_busy(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.busy
            .iter()
            .take_while(|(busy_start, _)| *busy_start < end)
            .any(|(busy_start, busy_end)| intervals_overlap(*busy_start, *busy_end, start, end))
    }

    /// Resolve a local candidate to UTC, or `None` when it cannot be offered:
    /// the start falls in a DST gap or the session straddles a clock change.
    fn resolve(&self, local_start: NaiveDateTime, local_end: NaiveDateTime) -> Option<Slot> {
        let start = self
            .tz
            .from_local_datetime(&local_start)
            .earliest()?
            .with_timezone(&Utc);
        let end = start + self.duration;

        if end.with_timezone(&self.tz).naive_local() != local_end {
            return None;
        }

        Some(Slot {
            start_time: start,
            end_time: end,
        })
    }

    fn admits(&self, slot: &Slot) -> bool {
        slot.start_time >= self.range_start
            && slot.start_time < self.range_end
            && slot.start_time >= self.not_before
            && !self.is_busy(slot.start_time, slot.end_time)
    }
}

impl<'a> IntoIterator for &'a SlotPlan {
    type Item = Slot;
    type IntoIter = SlotIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walks local days, then that weekday's windows, then granularity steps
/// inside each window.
#[derive(Debug, Clone)]
pub struct SlotIter<'a> {
    plan: &'a SlotPlan,
    day: Option<NaiveDate>,
    window: usize,
    cursor: Option<NaiveDateTime>,
}

impl SlotIter<'_> {
    fn next_day(&mut self) {
        self.day = self.day.and_then(|d| d.succ_opt());
        self.window = 0;
        self.cursor = None;
    }

    fn next_window(&mut self) {
        self.window += 1;
        self.cursor = None;
    }
}

impl Iterator for SlotIter<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let plan = self.plan;

        loop {
            let day = self.day.filter(|d| *d <= plan.last_day)?;

            let Some(window) = plan.windows.get(self.window) else {
                self.next_day();
                continue;
            };
            if window.day_of_week != day_index(day.weekday()) {
                self.next_window();
                continue;
            }

            let local_start = self.cursor.unwrap_or_else(|| day.and_time(window.start_time));
            let local_end = local_start + plan.duration;
            if local_end > day.and_time(window.end_time) {
                self.next_window();
                continue;
            }
            match local_start.checked_add_signed(plan.granularity) {
                Some(next) => self.cursor = Some(next),
                None => self.next_window(),
            }

            if let Some(slot) = plan.resolve(local_start, local_end) {
                if plan.admits(&slot) {
                    return Some(slot);
                }
            }
        }
    }
}
