use std::sync::Arc;

use tracing::{info, instrument, warn};

use schedule_cell::{
    Appointment, AppointmentStatus, AppointmentStore, AvailabilityService, ClockTime,
    NewAppointment, ScheduleError, Service, StoreError,
};

use crate::models::{BookAppointmentRequest, BookingError};
use crate::services::lock::BookingLockGuard;
use crate::services::notification::{notify_in_background, Notifier};

/// First slot after `requested`, else the first of the day.
pub fn next_available_slot(slots: &[ClockTime], requested: ClockTime) -> Option<ClockTime> {
    slots
        .iter()
        .copied()
        .find(|slot| *slot > requested)
        .or_else(|| slots.first().copied().filter(|slot| *slot != requested))
}

pub struct BookingService {
    availability: Arc<AvailabilityService>,
    appointments: Arc<dyn AppointmentStore>,
    locks: Arc<BookingLockGuard>,
    notifier: Arc<dyn Notifier>,
}

impl BookingService {
    pub fn new(
        availability: Arc<AvailabilityService>,
        appointments: Arc<dyn AppointmentStore>,
        locks: Arc<BookingLockGuard>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            availability,
            appointments,
            locks,
            notifier,
        }
    }

    /// Books a slot under the per-slot lock. The requested time must be one of
    /// the slots computed fresh inside the lock; the insert itself is still
    /// checked by the store's uniqueness rule.
    #[instrument(skip(self, request), fields(
        specialist_id = %request.specialist_id,
        date = %request.appointment_date,
        time = %request.appointment_time
    ))]
    pub async fn book_appointment(
        &self,
        request: &BookAppointmentRequest,
        client_id: &str,
    ) -> Result<Appointment, BookingError> {
        let service = self.bookable_service(request).await?;

        let appointment = self
            .locks
            .with_lock(request.slot_key(), client_id, || self.create_if_free(request, &service))
            .await?;

        info!(
            "Appointment {} booked with specialist {} on {} at {}",
            appointment.id,
            appointment.specialist_id,
            appointment.appointment_date,
            appointment.appointment_time
        );

        notify_in_background(self.notifier.clone(), appointment.clone());
        Ok(appointment)
    }

    async fn bookable_service(&self, request: &BookAppointmentRequest) -> Result<Service, BookingError> {
        let service = match self.availability.service(request.service_id).await {
            Ok(service) => service,
            Err(ScheduleError::ServiceNotFound(id)) => return Err(BookingError::ServiceUnavailable(id)),
            Err(e) => return Err(e.into()),
        };

        if !service.is_active || service.duration_minutes <= 0 {
            return Err(BookingError::ServiceUnavailable(service.id));
        }
        Ok(service)
    }

    async fn create_if_free(
        &self,
        request: &BookAppointmentRequest,
        service: &Service,
    ) -> Result<Appointment, BookingError> {
        let slots = self
            .availability
            .available_slots(request.specialist_id, service, request.appointment_date)
            .await?;
        let next_available = next_available_slot(&slots, request.appointment_time);

        if !slots.contains(&request.appointment_time) {
            warn!(
                "Requested slot {} on {} is not available",
                request.appointment_time, request.appointment_date
            );
            return Err(BookingError::SlotUnavailable {
                date: request.appointment_date,
                time: request.appointment_time,
                next_available,
            });
        }

        let new = NewAppointment {
            specialist_id: request.specialist_id,
            service_id: service.id,
            patient_id: request.patient_id,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            duration_minutes: service.duration_minutes,
            status: AppointmentStatus::Scheduled,
        };

        let appointment = match self.appointments.insert(&new).await {
            Ok(appointment) => appointment,
            Err(StoreError::UniqueViolation(detail)) => {
                warn!("Slot taken at insert time: {}", detail);
                return Err(BookingError::SlotUnavailable {
                    date: request.appointment_date,
                    time: request.appointment_time,
                    next_available,
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.keep_if_alone(appointment, request, service).await
    }

    /// The slot lock only covers one start time, so a booking at another start
    /// can overlap this one. Re-read after the insert: if any other scheduled
    /// row overlaps, this row is withdrawn. Of two racing rows at least one is
    /// withdrawn, possibly both; never neither.
    async fn keep_if_alone(
        &self,
        appointment: Appointment,
        request: &BookAppointmentRequest,
        service: &Service,
    ) -> Result<Appointment, BookingError> {
        let day = self
            .appointments
            .scheduled_on(appointment.specialist_id, appointment.appointment_date)
            .await?;
        let interval = appointment.interval();
        let overlapping = day
            .iter()
            .any(|other| other.id != appointment.id && other.interval().overlaps(&interval));
        if !overlapping {
            return Ok(appointment);
        }

        warn!(
            "Appointment {} overlaps a concurrent booking, withdrawing it",
            appointment.id
        );
        self.appointments.delete(appointment.id).await?;

        let slots = self
            .availability
            .available_slots(request.specialist_id, service, request.appointment_date)
            .await?;
        Err(BookingError::SlotUnavailable {
            date: request.appointment_date,
            time: request.appointment_time,
            next_available: next_available_slot(&slots, request.appointment_time),
        })
    }
}
