use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::{appointment_routes, AppointmentState, InMemoryLockStore, LogNotifier, SlotKey};
use schedule_cell::{InMemoryAppointmentStore, InMemoryScheduleStore, Service, WorkSchedule};
use shared_utils::clock::ManualClock;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    config: TestConfig,
    state: Arc<AppointmentState>,
    app_config: Arc<shared_config::AppConfig>,
    specialist_id: Uuid,
    service_id: Uuid,
    appointments: Arc<InMemoryAppointmentStore>,
    locks: Arc<InMemoryLockStore>,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn router(&self) -> Router {
        appointment_routes(self.app_config.clone(), self.state.clone())
    }

    fn booking_body(&self, time: &str) -> Value {
        json!({
            "specialist_id": self.specialist_id,
            "service_id": self.service_id,
            "patient_id": Uuid::new_v4(),
            "appointment_date": "2024-06-10",
            "appointment_time": time,
        })
    }
}

async fn create_test_app() -> TestApp {
    let config = TestConfig::default();
    let specialist_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    let schedules = Arc::new(InMemoryScheduleStore::new());
    schedules
        .add_service(Service {
            id: service_id,
            name: "Peeling".to_string(),
            duration_minutes: 60,
            is_active: true,
        })
        .await;
    schedules
        .add_weekly(WorkSchedule {
            id: Uuid::new_v4(),
            specialist_id,
            day_of_week: 1,
            start_time: "09:00".parse().unwrap(),
            end_time: "12:00".parse().unwrap(),
            lunch_start: None,
            lunch_end: None,
            allowed_service_ids: None,
            is_active: true,
        })
        .await;

    let appointments = Arc::new(InMemoryAppointmentStore::new());
    let locks = Arc::new(InMemoryLockStore::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap()));

    let app_config = config.to_arc();
    let state = Arc::new(AppointmentState::new(
        &app_config,
        schedules,
        appointments.clone(),
        locks.clone(),
        clock.clone(),
        Arc::new(LogNotifier),
    ));

    TestApp {
        config,
        state,
        app_config,
        specialist_id,
        service_id,
        appointments,
        locks,
        clock,
    }
}

fn admin_token(config: &TestConfig) -> String {
    JwtTestUtils::create_test_token(&TestUser::admin("admin@example.com"), &config.jwt_secret, None)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .header("x-client-id", "tab-1")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn book(app: &TestApp, time: &str) -> (StatusCode, Value) {
    send(app.router(), request("POST", "/", None, Some(app.booking_body(time)))).await
}

#[tokio::test]
async fn booking_is_public_and_returns_created() {
    let app = create_test_app().await;

    let (status, body) = book(&app, "10:00").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment_time"], "10:00");
    assert_eq!(body["duration_minutes"], 60);
    assert_eq!(body["status"], "scheduled");
    assert_eq!(app.appointments.all().await.len(), 1);
    assert!(app.locks.is_empty().await);
}

#[tokio::test]
async fn booking_without_client_header_still_works() {
    let app = create_test_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(app.booking_body("09:00").to_string()))
        .unwrap();

    let (status, _) = send(app.router(), req).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn double_booking_is_a_structured_conflict() {
    let app = create_test_app().await;
    book(&app, "10:00").await;

    let (status, body) = book(&app, "10:00").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SLOT_UNAVAILABLE");
    assert_eq!(body["details"]["next_available"], "11:00");
}

#[tokio::test]
async fn held_lock_is_reported_separately() {
    let app = create_test_app().await;
    let key = SlotKey {
        specialist_id: app.specialist_id,
        appointment_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        appointment_time: "11:00".parse().unwrap(),
    };
    let handle = app.state.locks.acquire(key, "tab-2").await.unwrap();

    let (status, body) = book(&app, "11:00").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "LOCK_HELD");
    assert_eq!(body["details"]["appointment_time"], "11:00");
    handle.release().await.unwrap();

    let (status, _) = book(&app, "11:00").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn malformed_time_is_rejected() {
    let app = create_test_app().await;

    let (status, _) = book(&app, "9am").await;
    assert!(status.is_client_error());
    assert!(app.appointments.all().await.is_empty());
}

#[tokio::test]
async fn lifecycle_routes_require_admin() {
    let app = create_test_app().await;
    let (_, booked) = book(&app, "09:00").await;
    let uri = format!("/{}/complete", booked["id"].as_str().unwrap());

    let (status, _) = send(app.router(), request("POST", &uri, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let patient = JwtTestUtils::create_test_token(
        &TestUser::patient("p@example.com"),
        &app.config.jwt_secret,
        None,
    );
    let (status, _) = send(app.router(), request("POST", &uri, Some(&patient), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_completes_then_cannot_cancel() {
    let app = create_test_app().await;
    let token = admin_token(&app.config);
    let (_, booked) = book(&app, "09:00").await;
    let id = booked["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app.router(),
        request("POST", &format!("/{}/complete", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, _) = send(
        app.router(),
        request("POST", &format!("/{}/cancel", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_is_hard_and_second_delete_is_not_found() {
    let app = create_test_app().await;
    let token = admin_token(&app.config);
    let (_, booked) = book(&app, "09:00").await;
    let uri = format!("/{}", booked["id"].as_str().unwrap());

    let (status, _) = send(app.router(), request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.appointments.all().await.is_empty());

    let (status, _) = send(app.router(), request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_can_sweep_expired_locks() {
    let app = create_test_app().await;
    let token = admin_token(&app.config);
    let key = SlotKey {
        specialist_id: app.specialist_id,
        appointment_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        appointment_time: "10:00".parse().unwrap(),
    };
    std::mem::forget(app.state.locks.acquire(key, "tab-9").await.unwrap());
    app.clock.advance(Duration::minutes(10));

    let (status, body) = send(app.router(), request("POST", "/locks/sweep", Some(&token), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert!(app.locks.is_empty().await);
}
