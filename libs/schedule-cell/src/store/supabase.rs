use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AppointmentStatus, Closure, ClosureRequest, NewAppointment, ProposedHours,
    ScheduleException, Service, WorkSchedule,
};

use super::{AppointmentStore, ScheduleStore, StoreError};

fn upsert_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("prefer"),
        HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
    );
    headers
}

fn hours_body(hours: &ProposedHours) -> serde_json::Value {
    json!({
        "start_time": hours.start_time,
        "end_time": hours.end_time,
        "lunch_start": hours.lunch_start,
        "lunch_end": hours.lunch_end,
        "allowed_service_ids": hours.allowed_service_ids,
        "is_active": true,
    })
}

fn first_row<T>(rows: Vec<T>, what: &str) -> Result<T, StoreError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::NotFound(format!("{} not returned by backend", what)))
}

/// Schedule tables on Supabase: `work_schedules`, `schedule_exceptions`,
/// `closures` and `services`.
pub struct SupabaseScheduleStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseScheduleStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl ScheduleStore for SupabaseScheduleStore {
    #[instrument(skip(self))]
    async fn closures_covering(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Closure>, StoreError> {
        let path = format!(
            "/rest/v1/closures?specialist_id=eq.{}&is_active=eq.true&start_date=lte.{}&end_date=gte.{}",
            specialist_id, date, date
        );
        Ok(self.supabase.request(Method::GET, &path, None, None).await?)
    }

    #[instrument(skip(self))]
    async fn closures_overlapping(
        &self,
        specialist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Closure>, StoreError> {
        let path = format!(
            "/rest/v1/closures?specialist_id=eq.{}&is_active=eq.true&start_date=lte.{}&end_date=gte.{}",
            specialist_id, end, start
        );
        Ok(self.supabase.request(Method::GET, &path, None, None).await?)
    }

    #[instrument(skip(self))]
    async fn exceptions_on(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleException>, StoreError> {
        let path = format!(
            "/rest/v1/schedule_exceptions?specialist_id=eq.{}&exception_date=eq.{}&is_active=eq.true",
            specialist_id, date
        );
        Ok(self.supabase.request(Method::GET, &path, None, None).await?)
    }

    #[instrument(skip(self))]
    async fn weekly_schedules(
        &self,
        specialist_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkSchedule>, StoreError> {
        let path = format!(
            "/rest/v1/work_schedules?specialist_id=eq.{}&day_of_week=eq.{}&is_active=eq.true",
            specialist_id, day_of_week
        );
        Ok(self.supabase.request(Method::GET, &path, None, None).await?)
    }

    #[instrument(skip(self))]
    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, StoreError> {
        let path = format!("/rest/v1/services?id=eq.{}", service_id);
        let rows: Vec<Service> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self, hours))]
    async fn upsert_weekly_schedule(
        &self,
        specialist_id: Uuid,
        day_of_week: i32,
        hours: &ProposedHours,
    ) -> Result<WorkSchedule, StoreError> {
        let mut body = hours_body(hours);
        body["specialist_id"] = json!(specialist_id);
        body["day_of_week"] = json!(day_of_week);

        let rows: Vec<WorkSchedule> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/work_schedules?on_conflict=specialist_id,day_of_week",
                None,
                Some(body),
                Some(upsert_headers()),
            )
            .await?;
        debug!("Upserted weekly schedule for specialist {} day {}", specialist_id, day_of_week);
        first_row(rows, "work schedule")
    }

    #[instrument(skip(self, hours))]
    async fn upsert_exception(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        hours: &ProposedHours,
    ) -> Result<ScheduleException, StoreError> {
        let mut body = hours_body(hours);
        body["specialist_id"] = json!(specialist_id);
        body["exception_date"] = json!(date);

        let rows: Vec<ScheduleException> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/schedule_exceptions?on_conflict=specialist_id,exception_date",
                None,
                Some(body),
                Some(upsert_headers()),
            )
            .await?;
        first_row(rows, "schedule exception")
    }

    #[instrument(skip(self, request))]
    async fn insert_closure(
        &self,
        specialist_id: Uuid,
        request: &ClosureRequest,
    ) -> Result<Closure, StoreError> {
        let body = json!({
            "specialist_id": specialist_id,
            "start_date": request.start_date,
            "end_date": request.end_date,
            "reason": request.reason,
            "is_active": true,
        });

        let rows: Vec<Closure> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/closures",
                None,
                Some(body),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;
        first_row(rows, "closure")
    }
}

/// The `appointments` table. Slot uniqueness is enforced by a partial unique
/// index on `(specialist_id, appointment_date, appointment_time)` excluding
/// cancelled rows; violations come back as `23505`.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, filter: String) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?{}&status=eq.scheduled&order=appointment_date.asc,appointment_time.asc",
            filter
        );
        Ok(self.supabase.request(Method::GET, &path, None, None).await?)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    #[instrument(skip(self))]
    async fn scheduled_on(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.fetch(format!("specialist_id=eq.{}&appointment_date=eq.{}", specialist_id, date))
            .await
    }

    #[instrument(skip(self))]
    async fn scheduled_from(
        &self,
        specialist_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.fetch(format!("specialist_id=eq.{}&appointment_date=gte.{}", specialist_id, from))
            .await
    }

    #[instrument(skip(self))]
    async fn scheduled_between(
        &self,
        specialist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.fetch(format!(
            "specialist_id=eq.{}&appointment_date=gte.{}&appointment_date=lte.{}",
            specialist_id, start, end
        ))
        .await
    }

    #[instrument(skip(self))]
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self, appointment))]
    async fn insert(&self, appointment: &NewAppointment) -> Result<Appointment, StoreError> {
        let body = serde_json::to_value(appointment)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                None,
                Some(body),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;
        first_row(rows, "appointment")
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(json!({ "status": status })),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment_id)))
    }

    #[instrument(skip(self))]
    async fn delete(&self, appointment_id: Uuid) -> Result<(), StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<serde_json::Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                None,
                Some(SupabaseClient::representation_headers()),
            )
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("appointment {}", appointment_id)));
        }
        Ok(())
    }
}
