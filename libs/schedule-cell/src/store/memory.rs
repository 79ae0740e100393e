use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, Closure, ClosureRequest, NewAppointment, ProposedHours,
    ScheduleException, Service, WorkSchedule,
};

use super::{AppointmentStore, ScheduleStore, StoreError};

#[derive(Default)]
pub struct InMemoryScheduleStore {
    weekly: RwLock<Vec<WorkSchedule>>,
    exceptions: RwLock<Vec<ScheduleException>>,
    closures: RwLock<Vec<Closure>>,
    services: RwLock<HashMap<Uuid, Service>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_weekly(&self, row: WorkSchedule) {
        self.weekly.write().await.push(row);
    }

    pub async fn add_exception(&self, row: ScheduleException) {
        self.exceptions.write().await.push(row);
    }

    pub async fn add_closure(&self, row: Closure) {
        self.closures.write().await.push(row);
    }

    pub async fn add_service(&self, service: Service) {
        self.services.write().await.insert(service.id, service);
    }

    pub async fn closures(&self) -> Vec<Closure> {
        self.closures.read().await.clone()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn closures_covering(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Closure>, StoreError> {
        Ok(self
            .closures
            .read()
            .await
            .iter()
            .filter(|c| c.specialist_id == specialist_id && c.is_active && c.covers(date))
            .cloned()
            .collect())
    }

    async fn closures_overlapping(
        &self,
        specialist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Closure>, StoreError> {
        Ok(self
            .closures
            .read()
            .await
            .iter()
            .filter(|c| {
                c.specialist_id == specialist_id
                    && c.is_active
                    && c.start_date <= end
                    && c.end_date >= start
            })
            .cloned()
            .collect())
    }

    async fn exceptions_on(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleException>, StoreError> {
        Ok(self
            .exceptions
            .read()
            .await
            .iter()
            .filter(|e| e.specialist_id == specialist_id && e.is_active && e.exception_date == date)
            .cloned()
            .collect())
    }

    async fn weekly_schedules(
        &self,
        specialist_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkSchedule>, StoreError> {
        Ok(self
            .weekly
            .read()
            .await
            .iter()
            .filter(|w| w.specialist_id == specialist_id && w.is_active && w.day_of_week == day_of_week)
            .cloned()
            .collect())
    }

    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, StoreError> {
        Ok(self.services.read().await.get(&service_id).cloned())
    }

    async fn upsert_weekly_schedule(
        &self,
        specialist_id: Uuid,
        day_of_week: i32,
        hours: &ProposedHours,
    ) -> Result<WorkSchedule, StoreError> {
        let mut weekly = self.weekly.write().await;
        let existing = weekly
            .iter()
            .position(|w| w.specialist_id == specialist_id && w.day_of_week == day_of_week);

        let row = WorkSchedule {
            id: existing.map(|i| weekly[i].id).unwrap_or_else(Uuid::new_v4),
            specialist_id,
            day_of_week,
            start_time: hours.start_time,
            end_time: hours.end_time,
            lunch_start: hours.lunch_start,
            lunch_end: hours.lunch_end,
            allowed_service_ids: hours.allowed_service_ids.clone(),
            is_active: true,
        };

        match existing {
            Some(i) => weekly[i] = row.clone(),
            None => weekly.push(row.clone()),
        }
        Ok(row)
    }

    async fn upsert_exception(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        hours: &ProposedHours,
    ) -> Result<ScheduleException, StoreError> {
        let mut exceptions = self.exceptions.write().await;
        let existing = exceptions
            .iter()
            .position(|e| e.specialist_id == specialist_id && e.exception_date == date);

        let row = ScheduleException {
            id: existing.map(|i| exceptions[i].id).unwrap_or_else(Uuid::new_v4),
            specialist_id,
            exception_date: date,
            start_time: hours.start_time,
            end_time: hours.end_time,
            lunch_start: hours.lunch_start,
            lunch_end: hours.lunch_end,
            allowed_service_ids: hours.allowed_service_ids.clone(),
            is_active: true,
        };

        match existing {
            Some(i) => exceptions[i] = row.clone(),
            None => exceptions.push(row.clone()),
        }
        Ok(row)
    }

    async fn insert_closure(
        &self,
        specialist_id: Uuid,
        request: &ClosureRequest,
    ) -> Result<Closure, StoreError> {
        let closure = Closure {
            id: Uuid::new_v4(),
            specialist_id,
            start_date: request.start_date,
            end_date: request.end_date,
            reason: request.reason.clone(),
            is_active: true,
        };
        self.closures.write().await.push(closure.clone());
        Ok(closure)
    }
}

/// Appointment table held in memory. Inserts check the slot-uniqueness rule
/// under the write lock, the same guarantee the database index gives.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    rows: RwLock<Vec<Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert without the uniqueness check, for seeding fixtures.
    pub async fn seed(&self, appointment: Appointment) {
        self.rows.write().await.push(appointment);
    }

    pub async fn all(&self) -> Vec<Appointment> {
        self.rows.read().await.clone()
    }

    async fn scheduled_where<F>(&self, specialist_id: Uuid, keep: F) -> Vec<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        let mut found: Vec<Appointment> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|a| a.specialist_id == specialist_id && a.occupies_time() && keep(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.appointment_date, a.appointment_time));
        found
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn scheduled_on(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.scheduled_where(specialist_id, |a| a.appointment_date == date).await)
    }

    async fn scheduled_from(
        &self,
        specialist_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.scheduled_where(specialist_id, |a| a.appointment_date >= from).await)
    }

    async fn scheduled_between(
        &self,
        specialist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self
            .scheduled_where(specialist_id, |a| {
                a.appointment_date >= start && a.appointment_date <= end
            })
            .await)
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|a| a.id == appointment_id)
            .cloned())
    }

    async fn insert(&self, new: &NewAppointment) -> Result<Appointment, StoreError> {
        let mut rows = self.rows.write().await;
        let taken = rows.iter().any(|a| {
            a.status != AppointmentStatus::Cancelled
                && a.specialist_id == new.specialist_id
                && a.appointment_date == new.appointment_date
                && a.appointment_time == new.appointment_time
        });
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "appointment already exists for {} at {} {}",
                new.specialist_id, new.appointment_date, new.appointment_time
            )));
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            specialist_id: new.specialist_id,
            service_id: new.service_id,
            patient_id: new.patient_id,
            appointment_date: new.appointment_date,
            appointment_time: new.appointment_time,
            duration_minutes: new.duration_minutes,
            status: new.status,
        };
        rows.push(appointment.clone());
        Ok(appointment)
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment_id)))?;
        row.status = status;
        Ok(row.clone())
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|a| a.id != appointment_id);
        if rows.len() == before {
            return Err(StoreError::NotFound(format!("appointment {}", appointment_id)));
        }
        Ok(())
    }
}
