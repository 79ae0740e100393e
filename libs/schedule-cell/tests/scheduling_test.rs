use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use schedule_cell::{
    AppointmentStatus, AvailabilityService, BookingCalendar, ClockTime, Closure, ClosureRequest,
    ConflictKind, ConflictValidator, EffectiveSchedule, ExceptionChangeRequest,
    InMemoryAppointmentStore, InMemoryScheduleStore, ProposedHours, ScheduleAdminService,
    ScheduleChangeRequest, ScheduleError, ScheduleException, Service, ValidationOutcome,
    WorkSchedule,
};
use schedule_cell::Appointment;
use shared_utils::clock::{ManualClock, SharedClock};

fn t(s: &str) -> ClockTime {
    s.parse().unwrap()
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

struct Fixture {
    specialist_id: Uuid,
    service: Service,
    schedules: Arc<InMemoryScheduleStore>,
    appointments: Arc<InMemoryAppointmentStore>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    /// Clock sits on Monday 2024-06-03 08:00 UTC.
    async fn new() -> Self {
        let fixture = Self {
            specialist_id: Uuid::new_v4(),
            service: Service {
                id: Uuid::new_v4(),
                name: "Limpieza facial".to_string(),
                duration_minutes: 45,
                is_active: true,
            },
            schedules: Arc::new(InMemoryScheduleStore::new()),
            appointments: Arc::new(InMemoryAppointmentStore::new()),
            clock: Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap())),
        };
        fixture.schedules.add_service(fixture.service.clone()).await;
        fixture
    }

    async fn weekly(&self, day_of_week: i32, start: &str, end: &str, lunch: Option<(&str, &str)>) {
        self.schedules
            .add_weekly(WorkSchedule {
                id: Uuid::new_v4(),
                specialist_id: self.specialist_id,
                day_of_week,
                start_time: t(start),
                end_time: t(end),
                lunch_start: lunch.map(|l| t(l.0)),
                lunch_end: lunch.map(|l| t(l.1)),
                allowed_service_ids: None,
                is_active: true,
            })
            .await;
    }

    async fn book(&self, date: &str, time: &str, minutes: i32, service_id: Uuid) -> Appointment {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            specialist_id: self.specialist_id,
            service_id,
            patient_id: Uuid::new_v4(),
            appointment_date: d(date),
            appointment_time: t(time),
            duration_minutes: minutes,
            status: AppointmentStatus::Scheduled,
        };
        self.appointments.seed(appointment.clone()).await;
        appointment
    }

    fn shared_clock(&self) -> SharedClock {
        self.clock.clone()
    }

    fn availability(&self, calendar: BookingCalendar) -> AvailabilityService {
        AvailabilityService::new(
            self.schedules.clone(),
            self.appointments.clone(),
            self.shared_clock(),
            calendar,
        )
    }

    fn validator(&self) -> Arc<ConflictValidator> {
        Arc::new(ConflictValidator::new(self.appointments.clone(), self.shared_clock(), 0))
    }

    fn admin(&self) -> ScheduleAdminService {
        ScheduleAdminService::new(self.validator(), self.schedules.clone())
    }
}

fn hours(start: &str, end: &str) -> ProposedHours {
    ProposedHours {
        start_time: t(start),
        end_time: t(end),
        lunch_start: None,
        lunch_end: None,
        allowed_service_ids: None,
    }
}

#[tokio::test]
async fn slots_skip_lunch_for_a_weekly_day() {
    let fx = Fixture::new().await;
    fx.weekly(1, "09:00", "14:00", Some(("13:00", "14:00"))).await;

    let slots = fx
        .availability(BookingCalendar::default())
        .available_slots(fx.specialist_id, &fx.service, d("2024-06-10"))
        .await
        .unwrap();

    let labels: Vec<String> = slots.iter().map(ToString::to_string).collect();
    assert_eq!(labels, ["09:00", "09:45", "10:30", "11:15", "12:00"]);
}

#[tokio::test]
async fn booked_appointments_remove_slots() {
    let fx = Fixture::new().await;
    fx.weekly(1, "09:00", "12:00", None).await;
    fx.book("2024-06-10", "09:45", 45, fx.service.id).await;

    let slots = fx
        .availability(BookingCalendar::default())
        .available_slots(fx.specialist_id, &fx.service, d("2024-06-10"))
        .await
        .unwrap();

    assert_eq!(slots, vec![t("09:00"), t("10:30"), t("11:15")]);
}

#[tokio::test]
async fn closed_and_past_days_have_no_slots() {
    let fx = Fixture::new().await;
    fx.weekly(1, "09:00", "17:00", None).await;
    fx.schedules
        .add_closure(Closure {
            id: Uuid::new_v4(),
            specialist_id: fx.specialist_id,
            start_date: d("2024-06-10"),
            end_date: d("2024-06-14"),
            reason: Some("Vacaciones".to_string()),
            is_active: true,
        })
        .await;
    let availability = fx.availability(BookingCalendar::default());

    let closed = availability.available_slots(fx.specialist_id, &fx.service, d("2024-06-10")).await.unwrap();
    assert!(closed.is_empty());

    // The previous Monday, before the clock's "today".
    let past = availability.available_slots(fx.specialist_id, &fx.service, d("2024-05-27")).await.unwrap();
    assert!(past.is_empty());
}

#[tokio::test]
async fn today_drops_slots_inside_notice_period() {
    let fx = Fixture::new().await;
    fx.weekly(1, "07:00", "12:00", None).await;
    fx.clock.set(Utc.with_ymd_and_hms(2024, 6, 3, 9, 10, 0).unwrap());

    let calendar = BookingCalendar { utc_offset_minutes: 0, min_notice_minutes: 60 };
    let slots = fx
        .availability(calendar)
        .available_slots(fx.specialist_id, &fx.service, d("2024-06-03"))
        .await
        .unwrap();

    // Cutoff is 10:10; 07:00 + 45 min steps give 10:45 and 11:30 (ends 12:15, too late).
    assert_eq!(slots, vec![t("10:45")]);
}

#[tokio::test]
async fn clinic_offset_moves_today() {
    let fx = Fixture::new().await;
    fx.weekly(0, "09:00", "12:00", None).await;
    // 02:00 UTC Monday is still Sunday evening three hours west.
    fx.clock.set(Utc.with_ymd_and_hms(2024, 6, 3, 2, 0, 0).unwrap());

    let calendar = BookingCalendar { utc_offset_minutes: -180, min_notice_minutes: 0 };
    let availability = fx.availability(calendar);
    assert_eq!(availability.today(), d("2024-06-02"));

    let sunday = availability.available_slots(fx.specialist_id, &fx.service, d("2024-06-02")).await.unwrap();
    assert!(sunday.is_empty(), "Sunday 23:00 has nothing left");
}

#[tokio::test]
async fn exception_overrides_weekly_for_its_date() {
    let fx = Fixture::new().await;
    fx.weekly(1, "09:00", "17:00", None).await;
    fx.schedules
        .add_exception(ScheduleException {
            id: Uuid::new_v4(),
            specialist_id: fx.specialist_id,
            exception_date: d("2024-06-10"),
            start_time: t("10:00"),
            end_time: t("11:30"),
            lunch_start: None,
            lunch_end: None,
            allowed_service_ids: None,
            is_active: true,
        })
        .await;
    let availability = fx.availability(BookingCalendar::default());

    let resolved = availability.resolver().resolve_schedule(fx.specialist_id, d("2024-06-10")).await.unwrap();
    assert_matches!(resolved, EffectiveSchedule::Window(ref w) if w.start_time == t("10:00"));

    let again = availability.resolver().resolve_schedule(fx.specialist_id, d("2024-06-10")).await.unwrap();
    assert_eq!(resolved, again);

    let slots = availability.available_slots(fx.specialist_id, &fx.service, d("2024-06-10")).await.unwrap();
    assert_eq!(slots, vec![t("10:00"), t("10:45")]);

    let next_week = availability.available_slots(fx.specialist_id, &fx.service, d("2024-06-17")).await.unwrap();
    assert_eq!(next_week.len(), 10);
}

#[tokio::test]
async fn available_dates_skip_closed_and_full_days() {
    let fx = Fixture::new().await;
    fx.weekly(1, "09:00", "09:45", None).await;
    fx.weekly(3, "09:00", "09:45", None).await;
    fx.book("2024-06-05", "09:00", 45, fx.service.id).await;

    let dates = fx
        .availability(BookingCalendar::default())
        .available_dates(fx.specialist_id, &fx.service, d("2024-06-03"), 14)
        .await
        .unwrap();

    assert_eq!(dates, vec![d("2024-06-03"), d("2024-06-10"), d("2024-06-12")]);
}

#[tokio::test]
async fn shorter_hours_flag_late_appointment() {
    let fx = Fixture::new().await;
    let late = fx.book("2024-06-10", "16:00", 45, fx.service.id).await;
    // Different weekday; must not show up for a Monday change.
    fx.book("2024-06-11", "16:00", 45, fx.service.id).await;

    let report = fx
        .validator()
        .validate_schedule_change(fx.specialist_id, 1, &hours("09:00", "14:00"))
        .await
        .unwrap();

    assert!(report.has_conflicts);
    assert!(!report.can_proceed);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].appointment_id, late.id);
    assert_eq!(report.conflicts[0].appointment_time, t("16:00"));
    assert_matches!(report.conflicts[0].kind, ConflictKind::OutsideHours { .. });
}

#[tokio::test]
async fn past_appointments_are_not_scanned() {
    let fx = Fixture::new().await;
    fx.book("2024-05-27", "16:00", 45, fx.service.id).await;

    let report = fx
        .validator()
        .validate_schedule_change(fx.specialist_id, 1, &hours("09:00", "14:00"))
        .await
        .unwrap();
    assert!(!report.has_conflicts);
}

#[tokio::test]
async fn empty_day_change_is_clear() {
    let fx = Fixture::new().await;

    let report = fx
        .validator()
        .validate_schedule_change(fx.specialist_id, 2, &hours("10:00", "11:00"))
        .await
        .unwrap();

    assert!(!report.has_conflicts);
    assert_eq!(report.affected_appointments_count, 0);
    assert_eq!(report.outcome, ValidationOutcome::Clear);
    assert!(report.recommendation.contains("no afecta ningún turno"));
}

#[tokio::test]
async fn restricted_services_flag_other_services() {
    let fx = Fixture::new().await;
    let allowed = Uuid::new_v4();
    fx.book("2024-06-10", "10:00", 30, Uuid::new_v4()).await;

    let mut proposal = hours("09:00", "17:00");
    proposal.allowed_service_ids = Some(vec![allowed]);

    let report = fx
        .validator()
        .validate_schedule_change(fx.specialist_id, 1, &proposal)
        .await
        .unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_matches!(report.conflicts[0].kind, ConflictKind::ServiceNotAllowed { .. });
}

#[tokio::test]
async fn closure_over_booked_day_is_blocked() {
    let fx = Fixture::new().await;
    fx.book("2024-06-12", "11:00", 45, fx.service.id).await;
    let request = ClosureRequest {
        start_date: d("2024-06-10"),
        end_date: d("2024-06-14"),
        reason: Some("Congreso".to_string()),
    };

    let report = fx
        .validator()
        .validate_closure(fx.specialist_id, request.start_date, request.end_date)
        .await
        .unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_matches!(report.conflicts[0].kind, ConflictKind::ClosureOverlap { .. });
    assert_eq!(report.outcome, ValidationOutcome::Blocked);
    assert!(!report.can_proceed);

    let blocked = fx.admin().create_closure(fx.specialist_id, &request).await;
    assert_matches!(blocked, Err(ScheduleError::ConflictBlocked { ref report }) if report.affected_appointments_count == 1);
    assert!(fx.schedules.closures().await.is_empty());
}

#[tokio::test]
async fn closure_on_free_range_is_created() {
    let fx = Fixture::new().await;
    let request = ClosureRequest { start_date: d("2024-07-01"), end_date: d("2024-07-05"), reason: None };

    let closure = fx.admin().create_closure(fx.specialist_id, &request).await.unwrap();
    assert_eq!(closure.start_date, d("2024-07-01"));
    assert_eq!(fx.schedules.closures().await.len(), 1);
}

#[tokio::test]
async fn inverted_closure_is_invalid() {
    let fx = Fixture::new().await;
    let request = ClosureRequest { start_date: d("2024-07-05"), end_date: d("2024-07-01"), reason: None };
    assert_matches!(
        fx.admin().create_closure(fx.specialist_id, &request).await,
        Err(ScheduleError::Time(_))
    );
}

#[tokio::test]
async fn weekly_change_needs_acknowledgement_when_conflicting() {
    let fx = Fixture::new().await;
    fx.weekly(1, "09:00", "17:00", None).await;
    fx.book("2024-06-10", "16:00", 45, fx.service.id).await;

    let mut change = ScheduleChangeRequest {
        day_of_week: 1,
        hours: hours("09:00", "14:00"),
        acknowledge_conflicts: false,
    };
    let admin = fx.admin();

    assert_matches!(
        admin.apply_schedule_change(fx.specialist_id, &change).await,
        Err(ScheduleError::ConflictBlocked { .. })
    );

    change.acknowledge_conflicts = true;
    let row = admin.apply_schedule_change(fx.specialist_id, &change).await.unwrap();
    assert_eq!(row.end_time, t("14:00"));

    // The upsert replaced the Monday row rather than adding a second one.
    let slots = fx
        .availability(BookingCalendar::default())
        .available_slots(fx.specialist_id, &fx.service, d("2024-06-17"))
        .await
        .unwrap();
    assert_eq!(slots.last(), Some(&t("12:45")));
}

#[tokio::test]
async fn exception_change_scans_only_its_date() {
    let fx = Fixture::new().await;
    fx.book("2024-06-10", "12:30", 45, fx.service.id).await;
    fx.book("2024-06-17", "12:30", 45, fx.service.id).await;

    let mut proposed = hours("09:00", "17:00");
    proposed.lunch_start = Some(t("13:00"));
    proposed.lunch_end = Some(t("14:00"));

    let change = ExceptionChangeRequest {
        exception_date: d("2024-06-10"),
        hours: proposed,
        acknowledge_conflicts: false,
    };

    let report = fx
        .validator()
        .validate_exception_change(fx.specialist_id, change.exception_date, &change.hours)
        .await
        .unwrap();
    assert_eq!(report.affected_appointments_count, 1);
    assert_matches!(report.conflicts[0].kind, ConflictKind::LunchConflict { .. });

    assert_matches!(
        fx.admin().apply_exception(fx.specialist_id, &change).await,
        Err(ScheduleError::ConflictBlocked { .. })
    );
}

#[tokio::test]
async fn malformed_admin_input_is_rejected_before_scanning() {
    let fx = Fixture::new().await;

    assert_matches!(
        fx.validator().validate_schedule_change(fx.specialist_id, 7, &hours("09:00", "17:00")).await,
        Err(ScheduleError::InvalidDayOfWeek(7))
    );
    assert_matches!(
        fx.validator().validate_schedule_change(fx.specialist_id, 1, &hours("17:00", "09:00")).await,
        Err(ScheduleError::Time(_))
    );
}
