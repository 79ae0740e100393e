use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Closure, ClosureRequest, ExceptionChangeRequest, ScheduleChangeRequest, ScheduleError,
    ScheduleException, WorkSchedule,
};
use crate::services::conflict::ConflictValidator;
use crate::store::ScheduleStore;

/// Writes admin schedule edits, gated by the conflict validator.
pub struct ScheduleAdminService {
    validator: Arc<ConflictValidator>,
    store: Arc<dyn ScheduleStore>,
}

impl ScheduleAdminService {
    pub fn new(validator: Arc<ConflictValidator>, store: Arc<dyn ScheduleStore>) -> Self {
        Self { validator, store }
    }

    pub fn validator(&self) -> &ConflictValidator {
        &self.validator
    }

    /// Upserts the weekly row. Conflicts block unless the request acknowledges them.
    #[instrument(skip(self, change), fields(day_of_week = change.day_of_week))]
    pub async fn apply_schedule_change(
        &self,
        specialist_id: Uuid,
        change: &ScheduleChangeRequest,
    ) -> Result<WorkSchedule, ScheduleError> {
        let report = self
            .validator
            .validate_schedule_change(specialist_id, change.day_of_week, &change.hours)
            .await?;

        if report.has_conflicts {
            if !change.acknowledge_conflicts {
                return Err(ScheduleError::ConflictBlocked { report });
            }
            warn!(
                "Applying weekly change for {} over {} acknowledged conflict(s)",
                specialist_id,
                report.conflicts.len()
            );
        }

        let row = self
            .store
            .upsert_weekly_schedule(specialist_id, change.day_of_week, &change.hours)
            .await?;
        info!("Weekly schedule {} saved for specialist {}", row.id, specialist_id);
        Ok(row)
    }

    #[instrument(skip(self, change), fields(date = %change.exception_date))]
    pub async fn apply_exception(
        &self,
        specialist_id: Uuid,
        change: &ExceptionChangeRequest,
    ) -> Result<ScheduleException, ScheduleError> {
        let report = self
            .validator
            .validate_exception_change(specialist_id, change.exception_date, &change.hours)
            .await?;

        if report.has_conflicts {
            if !change.acknowledge_conflicts {
                return Err(ScheduleError::ConflictBlocked { report });
            }
            warn!(
                "Applying exception for {} on {} over {} acknowledged conflict(s)",
                specialist_id,
                change.exception_date,
                report.conflicts.len()
            );
        }

        let row = self
            .store
            .upsert_exception(specialist_id, change.exception_date, &change.hours)
            .await?;
        info!("Schedule exception {} saved for specialist {}", row.id, specialist_id);
        Ok(row)
    }

    /// Closures have no override: any scheduled appointment in range blocks creation.
    #[instrument(skip(self, request))]
    pub async fn create_closure(
        &self,
        specialist_id: Uuid,
        request: &ClosureRequest,
    ) -> Result<Closure, ScheduleError> {
        request.validate()?;

        let report = self
            .validator
            .validate_closure(specialist_id, request.start_date, request.end_date)
            .await?;
        if report.has_conflicts {
            return Err(ScheduleError::ConflictBlocked { report });
        }

        let closure = self.store.insert_closure(specialist_id, request).await?;
        info!(
            "Closure {} created for specialist {} ({}..{})",
            closure.id, specialist_id, closure.start_date, closure.end_date
        );
        Ok(closure)
    }
}
