// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::{admin_middleware, auth_middleware};

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    // Public booking
    let public_routes = Router::new()
        .route("/", post(handlers::book_appointment));

    // Admin routes (authenticated, admin role)
    let admin_routes = Router::new()
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}", delete(handlers::delete_appointment))
        .route("/locks/sweep", post(handlers::sweep_locks))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}
