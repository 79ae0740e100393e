//! Persistence seams. Services talk to these traits; the API wires the
//! Supabase implementations and tests wire the in-memory ones.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;

use crate::models::{
    Appointment, AppointmentStatus, Closure, ClosureRequest, NewAppointment, ProposedHours,
    ScheduleException, Service, WorkSchedule,
};

pub use memory::{InMemoryAppointmentStore, InMemoryScheduleStore};
pub use supabase::{SupabaseAppointmentStore, SupabaseScheduleStore};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(message) => StoreError::UniqueViolation(message),
            DatabaseError::NotFound(message) => StoreError::NotFound(message),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Active closures whose inclusive range contains `date`.
    async fn closures_covering(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Closure>, StoreError>;

    /// Active closures intersecting the inclusive range `[start, end]`.
    async fn closures_overlapping(
        &self,
        specialist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Closure>, StoreError>;

    /// Active exceptions for exactly `date`.
    async fn exceptions_on(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleException>, StoreError>;

    /// Active weekly rows for `day_of_week` (0 = Sunday).
    async fn weekly_schedules(
        &self,
        specialist_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkSchedule>, StoreError>;

    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, StoreError>;

    async fn upsert_weekly_schedule(
        &self,
        specialist_id: Uuid,
        day_of_week: i32,
        hours: &ProposedHours,
    ) -> Result<WorkSchedule, StoreError>;

    async fn upsert_exception(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        hours: &ProposedHours,
    ) -> Result<ScheduleException, StoreError>;

    async fn insert_closure(
        &self,
        specialist_id: Uuid,
        request: &ClosureRequest,
    ) -> Result<Closure, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Scheduled appointments on `date`, ordered by time.
    async fn scheduled_on(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Scheduled appointments on or after `from`.
    async fn scheduled_from(
        &self,
        specialist_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Scheduled appointments within the inclusive date range.
    async fn scheduled_between(
        &self,
        specialist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when a non-cancelled appointment
    /// already holds the same specialist, date and start time.
    async fn insert(&self, appointment: &NewAppointment) -> Result<Appointment, StoreError>;

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError>;

    async fn delete(&self, appointment_id: Uuid) -> Result<(), StoreError>;
}
