use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::cache::TtlCache;
use shared_utils::clock::SharedClock;

use crate::models::{
    ClosureRequest, ExceptionChangeRequest, ScheduleChangeRequest, ScheduleError, Service,
};
use crate::services::{
    AvailabilityService, BookingCalendar, ConflictValidator, ScheduleAdminService,
};
use crate::store::{AppointmentStore, ScheduleStore, StoreError};

const DEFAULT_CALENDAR_DAYS: u32 = 30;

/// Everything the schedule routes need, built once at startup.
pub struct ScheduleState {
    pub availability: AvailabilityService,
    pub admin: ScheduleAdminService,
    service_cache: TtlCache<Uuid, Service>,
}

impl ScheduleState {
    pub fn new(
        config: &AppConfig,
        schedules: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: SharedClock,
    ) -> Self {
        let calendar = BookingCalendar::from_config(config);
        let validator = Arc::new(ConflictValidator::new(
            appointments.clone(),
            clock.clone(),
            calendar.utc_offset_minutes,
        ));

        Self {
            availability: AvailabilityService::new(
                schedules.clone(),
                appointments,
                clock.clone(),
                calendar,
            ),
            admin: ScheduleAdminService::new(validator, schedules),
            service_cache: TtlCache::new(
                Duration::seconds(config.service_cache_ttl_seconds),
                clock,
            ),
        }
    }

    /// Service lookups change rarely, so the HTTP layer caches them briefly.
    pub async fn cached_service(&self, service_id: Uuid) -> Result<Service, ScheduleError> {
        self.service_cache
            .get_or_try_insert_with(service_id, || self.availability.service(service_id))
            .await
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => AppError::NotFound(message),
            StoreError::UniqueViolation(message) => AppError::Conflict(message),
            StoreError::Backend(message) => AppError::Database(message),
        }
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Time(e) => AppError::ValidationError(e.to_string()),
            ScheduleError::InvalidDayOfWeek(_) => AppError::ValidationError(err.to_string()),
            ScheduleError::ServiceNotFound(_) => AppError::NotFound(err.to_string()),
            ScheduleError::ConflictBlocked { ref report } => {
                let details = serde_json::to_value(report).unwrap_or(Value::Null);
                AppError::rejected(
                    StatusCode::CONFLICT,
                    "SCHEDULE_CONFLICT_BLOCKED",
                    err.to_string(),
                    details,
                )
            }
            ScheduleError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
    pub service_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub service_id: Uuid,
    pub from: Option<NaiveDate>,
    pub days: Option<u32>,
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let schedule = state
        .availability
        .resolver()
        .resolve_schedule(specialist_id, query.date)
        .await?;

    Ok(Json(json!({
        "specialist_id": specialist_id,
        "date": query.date,
        "schedule": schedule,
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = state.cached_service(query.service_id).await?;
    let slots = state
        .availability
        .available_slots(specialist_id, &service, query.date)
        .await?;

    Ok(Json(json!({
        "specialist_id": specialist_id,
        "date": query.date,
        "service_id": service.id,
        "duration_minutes": service.duration_minutes,
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn get_available_dates(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let service = state.cached_service(query.service_id).await?;
    let from = query.from.unwrap_or_else(|| state.availability.today());
    let days = query.days.unwrap_or(DEFAULT_CALENDAR_DAYS);

    let dates = state
        .availability
        .available_dates(specialist_id, &service, from, days)
        .await?;
    debug!("{} bookable dates from {} for {}", dates.len(), from, specialist_id);

    Ok(Json(json!({
        "specialist_id": specialist_id,
        "service_id": service.id,
        "from": from,
        "dates": dates,
    })))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn validate_weekly_change(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Json(change): Json<ScheduleChangeRequest>,
) -> Result<Json<Value>, AppError> {
    let report = state
        .admin
        .validator()
        .validate_schedule_change(specialist_id, change.day_of_week, &change.hours)
        .await?;
    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn apply_weekly_change(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Json(change): Json<ScheduleChangeRequest>,
) -> Result<Json<Value>, AppError> {
    let row = state.admin.apply_schedule_change(specialist_id, &change).await?;
    Ok(Json(json!(row)))
}

#[axum::debug_handler]
pub async fn validate_exception(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Json(change): Json<ExceptionChangeRequest>,
) -> Result<Json<Value>, AppError> {
    let report = state
        .admin
        .validator()
        .validate_exception_change(specialist_id, change.exception_date, &change.hours)
        .await?;
    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn apply_exception(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Json(change): Json<ExceptionChangeRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let row = state.admin.apply_exception(specialist_id, &change).await?;
    Ok((StatusCode::CREATED, Json(json!(row))))
}

#[axum::debug_handler]
pub async fn validate_closure(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Json(request): Json<ClosureRequest>,
) -> Result<Json<Value>, AppError> {
    let report = state
        .admin
        .validator()
        .validate_closure(specialist_id, request.start_date, request.end_date)
        .await?;
    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn create_closure(
    State(state): State<Arc<ScheduleState>>,
    Path(specialist_id): Path<Uuid>,
    Json(request): Json<ClosureRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let closure = state.admin.create_closure(specialist_id, &request).await?;
    Ok((StatusCode::CREATED, Json(json!(closure))))
}
