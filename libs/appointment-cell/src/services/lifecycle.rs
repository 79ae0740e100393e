use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use schedule_cell::{Appointment, AppointmentStatus, AppointmentStore, StoreError};

use crate::models::BookingError;

/// Status changes after booking: scheduled moves to completed or cancelled,
/// nothing moves back. Deletion is a hard delete.
pub struct AppointmentLifecycleService {
    appointments: Arc<dyn AppointmentStore>,
}

impl AppointmentLifecycleService {
    pub fn new(appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { appointments }
    }

    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.transition(appointment_id, AppointmentStatus::Completed).await
    }

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.transition(appointment_id, AppointmentStatus::Cancelled).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, appointment_id: Uuid) -> Result<(), BookingError> {
        match self.appointments.delete(appointment_id).await {
            Ok(()) => {
                info!("Appointment {} deleted", appointment_id);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(BookingError::NotFound(appointment_id)),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        appointment_id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        let current = self
            .appointments
            .get(appointment_id)
            .await?
            .ok_or(BookingError::NotFound(appointment_id))?;

        if !current.status.can_transition_to(next) {
            return Err(BookingError::InvalidStatusTransition {
                from: current.status,
                to: next,
            });
        }

        let updated = self.appointments.update_status(appointment_id, next).await?;
        info!("Appointment {} is now {}", appointment_id, updated.status);
        Ok(updated)
    }
}
