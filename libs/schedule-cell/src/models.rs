use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::services::time::{ClockTime, TimeError, TimeRange};
use crate::store::StoreError;

// ==============================================================================
// SCHEDULE ROWS
// ==============================================================================

/// Recurring weekly hours for one specialist on one day of the week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkSchedule {
    pub id: Uuid,
    pub specialist_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: i32,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub lunch_start: Option<ClockTime>,
    pub lunch_end: Option<ClockTime>,
    /// `None` allows every service; an empty list allows none.
    pub allowed_service_ids: Option<Vec<Uuid>>,
    pub is_active: bool,
}

/// Override of the weekly hours for a single calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleException {
    pub id: Uuid,
    pub specialist_id: Uuid,
    pub exception_date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub lunch_start: Option<ClockTime>,
    pub lunch_end: Option<ClockTime>,
    pub allowed_service_ids: Option<Vec<Uuid>>,
    pub is_active: bool,
}

/// Inclusive date range during which the specialist does not work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Closure {
    pub id: Uuid,
    pub specialist_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub is_active: bool,
}

impl Closure {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub duration_minutes: i32,
    pub is_active: bool,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Completed and cancelled are terminal.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Scheduled, AppointmentStatus::Completed)
                | (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub specialist_id: Uuid,
    pub service_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: ClockTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn interval(&self) -> TimeRange {
        TimeRange::starting_at(self.appointment_time, self.duration_minutes.max(0) as u32)
    }

    /// Only scheduled appointments hold their time.
    pub fn occupies_time(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }
}

/// Insert payload; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub specialist_id: Uuid,
    pub service_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: ClockTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
}

// ==============================================================================
// EFFECTIVE SCHEDULE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSource {
    Exception { exception_id: Uuid },
    Weekly { schedule_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleWindow {
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub lunch_start: Option<ClockTime>,
    pub lunch_end: Option<ClockTime>,
    pub allowed_service_ids: Option<Vec<Uuid>>,
    pub source: WindowSource,
}

impl ScheduleWindow {
    pub fn from_weekly(row: &WorkSchedule) -> Self {
        Self {
            start_time: row.start_time,
            end_time: row.end_time,
            lunch_start: row.lunch_start,
            lunch_end: row.lunch_end,
            allowed_service_ids: row.allowed_service_ids.clone(),
            source: WindowSource::Weekly { schedule_id: row.id },
        }
    }

    pub fn from_exception(row: &ScheduleException) -> Self {
        Self {
            start_time: row.start_time,
            end_time: row.end_time,
            lunch_start: row.lunch_start,
            lunch_end: row.lunch_end,
            allowed_service_ids: row.allowed_service_ids.clone(),
            source: WindowSource::Exception { exception_id: row.id },
        }
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::between(self.start_time, self.end_time)
    }

    /// Lunch only counts when both ends are present and ordered.
    pub fn lunch(&self) -> Option<TimeRange> {
        lunch_range(self.lunch_start, self.lunch_end)
    }

    pub fn allows_service(&self, service_id: Uuid) -> bool {
        service_allowed(self.allowed_service_ids.as_deref(), service_id)
    }
}

/// What governs a specialist's day after closures, exceptions and weekly rows are combined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EffectiveSchedule {
    Closed {
        reason: String,
        closure_id: Option<Uuid>,
    },
    Window(ScheduleWindow),
}

impl EffectiveSchedule {
    pub fn is_closed(&self) -> bool {
        matches!(self, EffectiveSchedule::Closed { .. })
    }

    pub fn window(&self) -> Option<&ScheduleWindow> {
        match self {
            EffectiveSchedule::Window(window) => Some(window),
            EffectiveSchedule::Closed { .. } => None,
        }
    }
}

pub(crate) fn lunch_range(start: Option<ClockTime>, end: Option<ClockTime>) -> Option<TimeRange> {
    match (start, end) {
        (Some(start), Some(end)) if start < end => Some(TimeRange::between(start, end)),
        _ => None,
    }
}

pub(crate) fn service_allowed(allowed: Option<&[Uuid]>, service_id: Uuid) -> bool {
    allowed.map_or(true, |ids| ids.contains(&service_id))
}

pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

// ==============================================================================
// ADMIN CHANGE REQUESTS
// ==============================================================================

/// Proposed working hours, shared by weekly and date-specific changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedHours {
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default)]
    pub lunch_start: Option<ClockTime>,
    #[serde(default)]
    pub lunch_end: Option<ClockTime>,
    #[serde(default)]
    pub allowed_service_ids: Option<Vec<Uuid>>,
}

impl ProposedHours {
    pub fn validate(&self) -> Result<(), TimeError> {
        if self.start_time >= self.end_time {
            return Err(TimeError::InvalidWindow(format!(
                "start {} must be before end {}",
                self.start_time, self.end_time
            )));
        }

        match (self.lunch_start, self.lunch_end) {
            (None, None) => Ok(()),
            (Some(start), Some(end)) => {
                if start >= end {
                    return Err(TimeError::InvalidWindow(format!(
                        "lunch start {} must be before lunch end {}",
                        start, end
                    )));
                }
                if start < self.start_time || end > self.end_time {
                    return Err(TimeError::InvalidWindow(format!(
                        "lunch {}-{} must fall within {}-{}",
                        start, end, self.start_time, self.end_time
                    )));
                }
                Ok(())
            }
            _ => Err(TimeError::InvalidWindow(
                "lunch start and end must be provided together".to_string(),
            )),
        }
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::between(self.start_time, self.end_time)
    }

    pub fn lunch(&self) -> Option<TimeRange> {
        lunch_range(self.lunch_start, self.lunch_end)
    }

    pub fn allows_service(&self, service_id: Uuid) -> bool {
        service_allowed(self.allowed_service_ids.as_deref(), service_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleChangeRequest {
    pub day_of_week: i32,
    #[serde(flatten)]
    pub hours: ProposedHours,
    #[serde(default)]
    pub acknowledge_conflicts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionChangeRequest {
    pub exception_date: NaiveDate,
    #[serde(flatten)]
    pub hours: ProposedHours,
    #[serde(default)]
    pub acknowledge_conflicts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

impl ClosureRequest {
    pub fn validate(&self) -> Result<(), TimeError> {
        if self.start_date > self.end_date {
            return Err(TimeError::InvalidWindow(format!(
                "closure start {} must not be after end {}",
                self.start_date, self.end_date
            )));
        }
        Ok(())
    }
}

// ==============================================================================
// CONFLICT REPORTING
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictKind {
    OutsideHours {
        new_start: ClockTime,
        new_end: ClockTime,
    },
    LunchConflict {
        lunch_start: ClockTime,
        lunch_end: ClockTime,
    },
    ServiceNotAllowed {
        allowed_service_ids: Vec<Uuid>,
    },
    ClosureOverlap {
        closure_start: NaiveDate,
        closure_end: NaiveDate,
    },
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::OutsideHours { .. } => "fuera del nuevo horario",
            ConflictKind::LunchConflict { .. } => "en horario de almuerzo",
            ConflictKind::ServiceNotAllowed { .. } => "servicio no permitido",
            ConflictKind::ClosureOverlap { .. } => "dentro del cierre",
        }
    }
}

/// One reason one appointment would be broken by a proposed change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictRecord {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub service_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: ClockTime,
    pub duration_minutes: i32,
    #[serde(flatten)]
    pub kind: ConflictKind,
}

impl ConflictRecord {
    pub fn new(appointment: &Appointment, kind: ConflictKind) -> Self {
        Self {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            service_id: appointment.service_id,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            duration_minutes: appointment.duration_minutes,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Nothing affected.
    Clear,
    /// Admin may proceed after acknowledging the affected appointments.
    RequiresConfirmation,
    /// Must not proceed until the affected appointments are dealt with.
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictRecord>,
    /// Distinct appointments, not conflict records.
    pub affected_appointments_count: usize,
    pub can_proceed: bool,
    pub outcome: ValidationOutcome,
    pub recommendation: String,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("Invalid day of week: {0} (expected 0-6)")]
    InvalidDayOfWeek(i32),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Change blocked: {} scheduled appointment(s) affected", .report.affected_appointments_count)]
    ConflictBlocked { report: ValidationReport },

    #[error(transparent)]
    Store(#[from] StoreError),
}
