use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, AppointmentState};
use schedule_cell::{schedule_routes, ScheduleState};
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    schedules: Arc<ScheduleState>,
    appointments: Arc<AppointmentState>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Studio booking API is running!" }))
        .nest("/schedules", schedule_routes(config.clone(), schedules))
        .nest("/appointments", appointment_routes(config, appointments))
}
