use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{
    day_of_week, Closure, EffectiveSchedule, ScheduleError, ScheduleException, ScheduleWindow,
    WorkSchedule,
};
use crate::store::ScheduleStore;

pub const NO_SCHEDULE_REASON: &str = "no schedule configured";
pub const CLOSURE_DEFAULT_REASON: &str = "closed";

/// Strict, non-merging precedence: closure, then an exception for the exact
/// date used as a whole, then the weekly row for the day of week.
pub fn resolve_effective_schedule(
    date: NaiveDate,
    closures: &[Closure],
    exceptions: &[ScheduleException],
    weekly: &[WorkSchedule],
) -> EffectiveSchedule {
    if let Some(closure) = closures.iter().find(|c| c.is_active && c.covers(date)) {
        return EffectiveSchedule::Closed {
            reason: closure
                .reason
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| CLOSURE_DEFAULT_REASON.to_string()),
            closure_id: Some(closure.id),
        };
    }

    if let Some(exception) = exceptions
        .iter()
        .find(|e| e.is_active && e.exception_date == date)
    {
        return EffectiveSchedule::Window(ScheduleWindow::from_exception(exception));
    }

    let dow = day_of_week(date);
    if let Some(row) = weekly.iter().find(|w| w.is_active && w.day_of_week == dow) {
        return EffectiveSchedule::Window(ScheduleWindow::from_weekly(row));
    }

    EffectiveSchedule::Closed {
        reason: NO_SCHEDULE_REASON.to_string(),
        closure_id: None,
    }
}

pub struct ScheduleResolver {
    store: Arc<dyn ScheduleStore>,
}

impl ScheduleResolver {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    /// Effective schedule for one specialist on one calendar day.
    #[instrument(skip(self))]
    pub async fn resolve_schedule(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<EffectiveSchedule, ScheduleError> {
        let closures = self.store.closures_covering(specialist_id, date).await?;
        if !closures.is_empty() {
            return Ok(resolve_effective_schedule(date, &closures, &[], &[]));
        }

        let exceptions = self.store.exceptions_on(specialist_id, date).await?;
        if !exceptions.is_empty() {
            return Ok(resolve_effective_schedule(date, &[], &exceptions, &[]));
        }

        let weekly = self
            .store
            .weekly_schedules(specialist_id, day_of_week(date))
            .await?;
        let resolved = resolve_effective_schedule(date, &[], &[], &weekly);
        debug!("Resolved schedule for {} on {}: closed={}", specialist_id, date, resolved.is_closed());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WindowSource;
    use crate::services::time::ClockTime;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn weekly(dow: i32, start: &str, end: &str) -> WorkSchedule {
        WorkSchedule {
            id: Uuid::new_v4(),
            specialist_id: Uuid::nil(),
            day_of_week: dow,
            start_time: t(start),
            end_time: t(end),
            lunch_start: Some(t("13:00")),
            lunch_end: Some(t("14:00")),
            allowed_service_ids: None,
            is_active: true,
        }
    }

    fn exception(on: &str, start: &str, end: &str) -> ScheduleException {
        ScheduleException {
            id: Uuid::new_v4(),
            specialist_id: Uuid::nil(),
            exception_date: date(on),
            start_time: t(start),
            end_time: t(end),
            lunch_start: None,
            lunch_end: None,
            allowed_service_ids: Some(vec![]),
            is_active: true,
        }
    }

    fn closure(start: &str, end: &str, reason: Option<&str>) -> Closure {
        Closure {
            id: Uuid::new_v4(),
            specialist_id: Uuid::nil(),
            start_date: date(start),
            end_date: date(end),
            reason: reason.map(str::to_string),
            is_active: true,
        }
    }

    #[test]
    fn closure_beats_everything() {
        // 2024-06-10 is a Monday.
        let resolved = resolve_effective_schedule(
            date("2024-06-10"),
            &[closure("2024-06-10", "2024-06-14", Some("Vacaciones"))],
            &[exception("2024-06-10", "10:00", "12:00")],
            &[weekly(1, "09:00", "17:00")],
        );
        assert!(matches!(resolved, EffectiveSchedule::Closed { ref reason, closure_id: Some(_) } if reason == "Vacaciones"));
    }

    #[test]
    fn closure_range_is_inclusive() {
        let closures = [closure("2024-06-10", "2024-06-14", None)];
        assert!(resolve_effective_schedule(date("2024-06-14"), &closures, &[], &[]).is_closed());
        let after = resolve_effective_schedule(date("2024-06-15"), &closures, &[], &[weekly(6, "09:00", "12:00")]);
        assert!(!after.is_closed());
    }

    #[test]
    fn exception_replaces_weekly_without_merging() {
        let resolved = resolve_effective_schedule(
            date("2024-06-10"),
            &[],
            &[exception("2024-06-10", "10:00", "12:00")],
            &[weekly(1, "09:00", "17:00")],
        );
        let window = resolved.window().unwrap();
        assert_eq!(window.start_time, t("10:00"));
        assert_eq!(window.lunch(), None);
        assert_eq!(window.allowed_service_ids, Some(vec![]));
        assert!(matches!(window.source, WindowSource::Exception { .. }));
    }

    #[test]
    fn weekly_row_matches_day_of_week() {
        let rows = [weekly(2, "08:00", "12:00"), weekly(1, "09:00", "17:00")];
        let window = resolve_effective_schedule(date("2024-06-10"), &[], &[], &rows);
        assert_eq!(window.window().unwrap().start_time, t("09:00"));
    }

    #[test]
    fn inactive_rows_are_ignored() {
        let mut row = weekly(1, "09:00", "17:00");
        row.is_active = false;
        let mut ex = exception("2024-06-10", "10:00", "12:00");
        ex.is_active = false;
        let mut cl = closure("2024-06-10", "2024-06-10", None);
        cl.is_active = false;

        let resolved = resolve_effective_schedule(date("2024-06-10"), &[cl], &[ex], &[row]);
        assert_eq!(
            resolved,
            EffectiveSchedule::Closed { reason: NO_SCHEDULE_REASON.to_string(), closure_id: None }
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let rows = [weekly(1, "09:00", "17:00")];
        let a = resolve_effective_schedule(date("2024-06-10"), &[], &[], &rows);
        let b = resolve_effective_schedule(date("2024-06-10"), &[], &[], &rows);
        assert_eq!(a, b);
    }
}
