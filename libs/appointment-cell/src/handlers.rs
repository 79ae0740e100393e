// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    Json,
};
use axum_extra::TypedHeader;
use headers::Header;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use schedule_cell::{
    AppointmentStore, AvailabilityService, BookingCalendar, ScheduleStore,
};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::clock::SharedClock;

use crate::models::{BookAppointmentRequest, BookingError};
use crate::services::{
    AppointmentLifecycleService, BookingLockGuard, BookingService, LockStore, Notifier,
};

// ==============================================================================
// STATE
// ==============================================================================

pub struct AppointmentState {
    pub booking: BookingService,
    pub lifecycle: AppointmentLifecycleService,
    pub locks: Arc<BookingLockGuard>,
}

impl AppointmentState {
    pub fn new(
        config: &AppConfig,
        schedules: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        lock_store: Arc<dyn LockStore>,
        clock: SharedClock,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let availability = Arc::new(AvailabilityService::new(
            schedules,
            appointments.clone(),
            clock.clone(),
            BookingCalendar::from_config(config),
        ));
        let locks = Arc::new(BookingLockGuard::from_config(lock_store, clock, config));

        Self {
            booking: BookingService::new(availability, appointments.clone(), locks.clone(), notifier),
            lifecycle: AppointmentLifecycleService::new(appointments),
            locks,
        }
    }
}

// ==============================================================================
// X-Client-Id
// ==============================================================================

static X_CLIENT_ID: HeaderName = HeaderName::from_static("x-client-id");

/// Identifies the browser tab holding a booking lock.
#[derive(Debug, Clone)]
pub struct ClientId(pub String);

impl Header for ClientId {
    fn name() -> &'static HeaderName {
        &X_CLIENT_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let id = value.to_str().map_err(|_| headers::Error::invalid())?.trim();
        if id.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(ClientId(id.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Time(e) => AppError::ValidationError(e.to_string()),
            BookingError::ServiceUnavailable(_) => AppError::BadRequest(err.to_string()),
            BookingError::LockHeld { key, expires_at } => AppError::rejected(
                StatusCode::CONFLICT,
                "LOCK_HELD",
                err.to_string(),
                json!({
                    "specialist_id": key.specialist_id,
                    "appointment_date": key.appointment_date,
                    "appointment_time": key.appointment_time,
                    "expires_at": expires_at,
                }),
            ),
            BookingError::SlotUnavailable { date, time, next_available } => AppError::rejected(
                StatusCode::CONFLICT,
                "SLOT_UNAVAILABLE",
                err.to_string(),
                json!({
                    "appointment_date": date,
                    "appointment_time": time,
                    "next_available": next_available,
                }),
            ),
            BookingError::NotFound(_) => AppError::NotFound(err.to_string()),
            BookingError::InvalidStatusTransition { .. } => AppError::Conflict(err.to_string()),
            BookingError::Schedule(e) => e.into(),
            BookingError::Store(e) => e.into(),
        }
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

/// Without an `X-Client-Id` header the request gets a one-off owner id.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    client: Option<TypedHeader<ClientId>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let client_id = match client {
        Some(TypedHeader(ClientId(id))) => id,
        None => format!("anon_{}", Uuid::new_v4()),
    };
    debug!("Booking request from client {}", client_id);

    let appointment = state.booking.book_appointment(&request, &client_id).await?;
    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.complete(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.cancel(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.lifecycle.delete(appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn sweep_locks(
    State(state): State<Arc<AppointmentState>>,
) -> Result<Json<Value>, AppError> {
    let removed = state.locks.sweep_expired().await?;
    Ok(Json(json!({ "removed": removed })))
}
