use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument};
use uuid::Uuid;

use shared_utils::clock::{local_today, SharedClock};

use crate::models::{
    day_of_week, Appointment, ConflictKind, ConflictRecord, ProposedHours, ScheduleError,
    ValidationOutcome, ValidationReport,
};
use crate::services::time::TimeError;
use crate::store::AppointmentStore;

/// Every rule a single appointment breaks under the proposed hours, one entry per rule.
///
/// An empty `allowed_service_ids` list allows nothing, so it flags every
/// appointment as `service_not_allowed`, the same reading slot computation
/// uses. Only `None` means "any service".
pub fn classify_appointment(appointment: &Appointment, hours: &ProposedHours) -> Vec<ConflictKind> {
    let mut kinds = Vec::new();
    let interval = appointment.interval();

    if !hours.range().contains(&interval) {
        kinds.push(ConflictKind::OutsideHours {
            new_start: hours.start_time,
            new_end: hours.end_time,
        });
    }

    if let (Some(lunch), Some(lunch_start), Some(lunch_end)) =
        (hours.lunch(), hours.lunch_start, hours.lunch_end)
    {
        if lunch.overlaps(&interval) {
            kinds.push(ConflictKind::LunchConflict { lunch_start, lunch_end });
        }
    }

    if let Some(allowed) = &hours.allowed_service_ids {
        if !allowed.contains(&appointment.service_id) {
            kinds.push(ConflictKind::ServiceNotAllowed {
                allowed_service_ids: allowed.clone(),
            });
        }
    }

    kinds
}

pub fn classify_all(appointments: &[Appointment], hours: &ProposedHours) -> Vec<ConflictRecord> {
    appointments
        .iter()
        .filter(|apt| apt.occupies_time())
        .flat_map(|apt| {
            classify_appointment(apt, hours)
                .into_iter()
                .map(move |kind| ConflictRecord::new(apt, kind))
        })
        .collect()
}

/// Scheduled appointments whose date falls within the inclusive closure range.
pub fn closure_conflicts(
    appointments: &[Appointment],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<ConflictRecord> {
    appointments
        .iter()
        .filter(|apt| apt.occupies_time())
        .filter(|apt| apt.appointment_date >= start && apt.appointment_date <= end)
        .map(|apt| {
            ConflictRecord::new(
                apt,
                ConflictKind::ClosureOverlap { closure_start: start, closure_end: end },
            )
        })
        .collect()
}

/// Which message and outcome a report gets when it does find conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Schedule,
    Closure,
}

pub fn build_report(conflicts: Vec<ConflictRecord>, change: ChangeKind) -> ValidationReport {
    let affected: HashSet<Uuid> = conflicts.iter().map(|c| c.appointment_id).collect();
    let has_conflicts = !conflicts.is_empty();

    let outcome = match (has_conflicts, change) {
        (false, _) => ValidationOutcome::Clear,
        (true, ChangeKind::Schedule) => ValidationOutcome::RequiresConfirmation,
        (true, ChangeKind::Closure) => ValidationOutcome::Blocked,
    };

    let recommendation = recommendation_for(&conflicts, affected.len(), change);

    ValidationReport {
        has_conflicts,
        affected_appointments_count: affected.len(),
        can_proceed: !has_conflicts,
        outcome,
        recommendation,
        conflicts,
    }
}

fn recommendation_for(conflicts: &[ConflictRecord], affected: usize, change: ChangeKind) -> String {
    if conflicts.is_empty() {
        return match change {
            ChangeKind::Schedule => "El cambio no afecta ningún turno programado.".to_string(),
            ChangeKind::Closure => "El cierre no afecta ningún turno programado.".to_string(),
        };
    }

    match change {
        ChangeKind::Schedule => {
            let mut breakdown: Vec<(&'static str, usize)> = Vec::new();
            for conflict in conflicts {
                let label = conflict.kind.label();
                match breakdown.iter_mut().find(|(l, _)| *l == label) {
                    Some((_, count)) => *count += 1,
                    None => breakdown.push((label, 1)),
                }
            }
            let detail = breakdown
                .iter()
                .map(|(label, count)| format!("{}: {}", label, count))
                .collect::<Vec<_>>()
                .join(", ");

            format!(
                "El cambio afecta {} turno(s) programado(s) ({}). Contactá a los pacientes para reprogramar antes de confirmar.",
                affected, detail
            )
        }
        ChangeKind::Closure => format!(
            "El cierre se superpone con {} turno(s) programado(s). Reprogramá o cancelá esos turnos antes de crear el cierre.",
            affected
        ),
    }
}

pub fn validate_day_of_week(day: i32) -> Result<(), ScheduleError> {
    if !(0..=6).contains(&day) {
        return Err(ScheduleError::InvalidDayOfWeek(day));
    }
    Ok(())
}

/// Finds the booked appointments a proposed schedule edit or closure would break.
pub struct ConflictValidator {
    appointments: Arc<dyn AppointmentStore>,
    clock: SharedClock,
    utc_offset_minutes: i32,
}

impl ConflictValidator {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        clock: SharedClock,
        utc_offset_minutes: i32,
    ) -> Self {
        Self { appointments, clock, utc_offset_minutes }
    }

    fn today(&self) -> NaiveDate {
        local_today(self.clock.as_ref(), self.utc_offset_minutes)
    }

    /// Recurring change: every scheduled appointment from today on that falls on `day`.
    #[instrument(skip(self, hours))]
    pub async fn validate_schedule_change(
        &self,
        specialist_id: Uuid,
        day: i32,
        hours: &ProposedHours,
    ) -> Result<ValidationReport, ScheduleError> {
        validate_day_of_week(day)?;
        hours.validate()?;

        let upcoming: Vec<Appointment> = self
            .appointments
            .scheduled_from(specialist_id, self.today())
            .await?
            .into_iter()
            .filter(|apt| day_of_week(apt.appointment_date) == day)
            .collect();

        let report = build_report(classify_all(&upcoming, hours), ChangeKind::Schedule);
        if report.has_conflicts {
            info!(
                "Weekly change for specialist {} day {} affects {} appointment(s)",
                specialist_id, day, report.affected_appointments_count
            );
        }
        Ok(report)
    }

    /// Date-specific change: appointments on exactly `date`.
    #[instrument(skip(self, hours))]
    pub async fn validate_exception_change(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        hours: &ProposedHours,
    ) -> Result<ValidationReport, ScheduleError> {
        hours.validate()?;

        let on_date = self.appointments.scheduled_on(specialist_id, date).await?;
        let report = build_report(classify_all(&on_date, hours), ChangeKind::Schedule);
        if report.has_conflicts {
            info!(
                "Exception for specialist {} on {} affects {} appointment(s)",
                specialist_id, date, report.affected_appointments_count
            );
        }
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn validate_closure(
        &self,
        specialist_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ValidationReport, ScheduleError> {
        if start > end {
            return Err(TimeError::InvalidWindow(format!(
                "closure start {} must not be after end {}",
                start, end
            ))
            .into());
        }

        let in_range = self
            .appointments
            .scheduled_between(specialist_id, start, end)
            .await?;
        let report = build_report(closure_conflicts(&in_range, start, end), ChangeKind::Closure);
        if report.has_conflicts {
            info!(
                "Closure {}..{} for specialist {} overlaps {} appointment(s)",
                start, end, specialist_id, report.affected_appointments_count
            );
        }
        Ok(report)
    }
}
