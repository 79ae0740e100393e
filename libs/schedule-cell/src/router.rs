use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::{admin_middleware, auth_middleware};

use crate::handlers::{self, ScheduleState};

pub fn schedule_routes(config: Arc<AppConfig>, state: Arc<ScheduleState>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/specialists/{specialist_id}/schedule", get(handlers::get_schedule))
        .route("/specialists/{specialist_id}/slots", get(handlers::get_available_slots))
        .route("/specialists/{specialist_id}/available-dates", get(handlers::get_available_dates));

    // Admin routes (authenticated, admin role)
    let admin_routes = Router::new()
        .route("/specialists/{specialist_id}/weekly/validate", post(handlers::validate_weekly_change))
        .route("/specialists/{specialist_id}/weekly", put(handlers::apply_weekly_change))
        .route("/specialists/{specialist_id}/exceptions/validate", post(handlers::validate_exception))
        .route("/specialists/{specialist_id}/exceptions", post(handlers::apply_exception))
        .route("/specialists/{specialist_id}/closures/validate", post(handlers::validate_closure))
        .route("/specialists/{specialist_id}/closures", post(handlers::create_closure))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}
