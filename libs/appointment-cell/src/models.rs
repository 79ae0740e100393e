use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use schedule_cell::{AppointmentStatus, ClockTime, ScheduleError, StoreError, TimeError};

// ==============================================================================
// BOOKING REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub specialist_id: Uuid,
    pub service_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: ClockTime,
}

impl BookAppointmentRequest {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            specialist_id: self.specialist_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
        }
    }
}

// ==============================================================================
// BOOKING LOCKS
// ==============================================================================

/// The exact slot a lock guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub specialist_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: ClockTime,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot_{}_{}_{}",
            self.specialist_id, self.appointment_date, self.appointment_time
        )
    }
}

/// Row in `booking_locks`, unique on (specialist_id, appointment_date, appointment_time).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingLock {
    pub id: Uuid,
    pub specialist_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: ClockTime,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BookingLock {
    pub fn new(key: SlotKey, locked_by: &str, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            specialist_id: key.specialist_id,
            appointment_date: key.appointment_date,
            appointment_time: key.appointment_time,
            locked_by: locked_by.to_string(),
            locked_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey {
            specialist_id: self.specialist_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum BookingError {
    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("Service not available for booking: {0}")]
    ServiceUnavailable(Uuid),

    #[error("Slot {key} is being booked by another client, try again shortly")]
    LockHeld {
        key: SlotKey,
        expires_at: DateTime<Utc>,
    },

    #[error("Slot {time} on {date} is no longer available")]
    SlotUnavailable {
        date: NaiveDate,
        time: ClockTime,
        next_available: Option<ClockTime>,
    },

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_key_display_is_stable() {
        let key = SlotKey {
            specialist_id: Uuid::nil(),
            appointment_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            appointment_time: "09:30".parse().unwrap(),
        };
        assert_eq!(
            key.to_string(),
            "slot_00000000-0000-0000-0000-000000000000_2024-06-10_09:30"
        );
    }

    #[test]
    fn lock_expires_at_ttl() {
        let now = Utc::now();
        let key = SlotKey {
            specialist_id: Uuid::new_v4(),
            appointment_date: now.date_naive(),
            appointment_time: "10:00".parse().unwrap(),
        };
        let lock = BookingLock::new(key, "client-a", now, chrono::Duration::minutes(5));

        assert_eq!(lock.key(), key);
        assert!(!lock.is_expired(now + chrono::Duration::minutes(4)));
        assert!(lock.is_expired(now + chrono::Duration::minutes(5)));
    }
}
