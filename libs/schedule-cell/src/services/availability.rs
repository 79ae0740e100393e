use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_utils::clock::{local_now, SharedClock};

use crate::models::{Appointment, ScheduleError, ScheduleWindow, Service};
use crate::services::resolver::ScheduleResolver;
use crate::services::time::{merge_overlapping, ClockTime, TimeError, TimeRange};
use crate::store::{AppointmentStore, ScheduleStore};

/// Longest range `available_dates` will scan in one call.
pub const MAX_CALENDAR_DAYS: u32 = 62;

/// Bookable start times for `service` inside `window`.
///
/// Steps from the window start in increments of the service duration; a
/// candidate is kept when its whole interval sits inside the window and
/// overlaps neither lunch nor any scheduled appointment. Touching is not
/// overlapping, so slots may end exactly at lunch or at another booking.
/// Disallowed or inactive services, non-positive durations and inverted
/// windows all yield an empty list.
pub fn compute_available_slots(
    window: &ScheduleWindow,
    service: &Service,
    existing: &[Appointment],
) -> Vec<ClockTime> {
    if !service.is_active || service.duration_minutes <= 0 {
        return Vec::new();
    }
    if !window.allows_service(service.id) {
        return Vec::new();
    }

    let bounds = window.range();
    if bounds.is_empty() {
        return Vec::new();
    }

    let mut occupied: Vec<TimeRange> = existing
        .iter()
        .filter(|apt| apt.occupies_time())
        .map(Appointment::interval)
        .collect();
    if let Some(lunch) = window.lunch() {
        occupied.push(lunch);
    }
    occupied.sort();
    let occupied = merge_overlapping(&occupied);

    let duration = service.duration_minutes as u32;
    let mut slots = Vec::new();
    let mut current = bounds.start;

    while current + duration <= bounds.end {
        let candidate = TimeRange::new(current, current + duration);
        let blocked = occupied.iter().any(|busy| busy.overlaps(&candidate));
        if !blocked {
            if let Ok(start) = ClockTime::from_minutes(current) {
                slots.push(start);
            }
        }
        current += duration;
    }

    slots
}

/// Calendar settings that decide what "now" and "too soon" mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingCalendar {
    pub utc_offset_minutes: i32,
    pub min_notice_minutes: i64,
}

impl BookingCalendar {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            utc_offset_minutes: config.clinic_utc_offset_minutes,
            min_notice_minutes: config.min_booking_notice_minutes.max(0),
        }
    }
}

impl Default for BookingCalendar {
    fn default() -> Self {
        Self { utc_offset_minutes: 0, min_notice_minutes: 0 }
    }
}

pub struct AvailabilityService {
    resolver: ScheduleResolver,
    schedules: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: SharedClock,
    calendar: BookingCalendar,
}

impl AvailabilityService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: SharedClock,
        calendar: BookingCalendar,
    ) -> Self {
        Self {
            resolver: ScheduleResolver::new(schedules.clone()),
            schedules,
            appointments,
            clock,
            calendar,
        }
    }

    pub fn resolver(&self) -> &ScheduleResolver {
        &self.resolver
    }

    pub fn local_now(&self) -> NaiveDateTime {
        local_now(self.clock.as_ref(), self.calendar.utc_offset_minutes)
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date()
    }

    /// Loads a service by id, failing when it does not exist.
    pub async fn service(&self, service_id: Uuid) -> Result<Service, ScheduleError> {
        self.schedules
            .service(service_id)
            .await?
            .ok_or(ScheduleError::ServiceNotFound(service_id))
    }

    /// Slots for a specialist on a date, always read fresh from the stores.
    /// Past dates are empty; today drops anything inside the notice period.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn available_slots(
        &self,
        specialist_id: Uuid,
        service: &Service,
        date: NaiveDate,
    ) -> Result<Vec<ClockTime>, ScheduleError> {
        let now = self.local_now();
        if date < now.date() {
            return Ok(Vec::new());
        }

        let schedule = self.resolver.resolve_schedule(specialist_id, date).await?;
        let Some(window) = schedule.window() else {
            return Ok(Vec::new());
        };

        let existing = self.appointments.scheduled_on(specialist_id, date).await?;
        let slots = compute_available_slots(window, service, &existing);
        let slots = self.drop_too_soon(date, slots, now);

        debug!("Found {} available slots for {} on {}", slots.len(), specialist_id, date);
        Ok(slots)
    }

    /// Dates in `[from, from + days)` with at least one bookable slot.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn available_dates(
        &self,
        specialist_id: Uuid,
        service: &Service,
        from: NaiveDate,
        days: u32,
    ) -> Result<Vec<NaiveDate>, ScheduleError> {
        let days = days.min(MAX_CALENDAR_DAYS);
        if days == 0 {
            return Ok(Vec::new());
        }

        let last = from
            .checked_add_signed(Duration::days(i64::from(days) - 1))
            .ok_or_else(|| {
                TimeError::InvalidWindow(format!("{} days from {} is past the calendar end", days, from))
            })?;
        let closures = self
            .schedules
            .closures_overlapping(specialist_id, from, last)
            .await?;

        let mut dates = Vec::new();
        for date in from.iter_days().take(days as usize) {
            if closures.iter().any(|c| c.is_active && c.covers(date)) {
                continue;
            }
            if !self.available_slots(specialist_id, service, date).await?.is_empty() {
                dates.push(date);
            }
        }

        Ok(dates)
    }

    fn drop_too_soon(
        &self,
        date: NaiveDate,
        mut slots: Vec<ClockTime>,
        now: NaiveDateTime,
    ) -> Vec<ClockTime> {
        let cutoff = now + Duration::minutes(self.calendar.min_notice_minutes);
        if cutoff.date() < date {
            return slots;
        }
        if cutoff.date() > date {
            return Vec::new();
        }

        let cutoff_seconds = cutoff.time().num_seconds_from_midnight();
        slots.retain(|slot| slot.minutes() * 60 >= cutoff_seconds);
        slots
    }
}
