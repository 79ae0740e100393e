use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{notifier_from_config, spawn_lock_sweeper, AppointmentState, SupabaseLockStore};
use schedule_cell::{ScheduleState, SupabaseAppointmentStore, SupabaseScheduleStore};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::clock::{SharedClock, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting studio booking API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    if !config.is_configured() {
        warn!("Supabase is not fully configured; storage calls will fail");
    }

    // Storage and clock
    let supabase = Arc::new(SupabaseClient::new(&config));
    let schedules = Arc::new(SupabaseScheduleStore::new(supabase.clone()));
    let appointments = Arc::new(SupabaseAppointmentStore::new(supabase.clone()));
    let locks = Arc::new(SupabaseLockStore::new(supabase));
    let clock: SharedClock = Arc::new(SystemClock);

    // Cell state
    let schedule_state = Arc::new(ScheduleState::new(
        &config,
        schedules.clone(),
        appointments.clone(),
        clock.clone(),
    ));
    let appointment_state = Arc::new(AppointmentState::new(
        &config,
        schedules,
        appointments,
        locks,
        clock,
        notifier_from_config(&config),
    ));

    // Expired booking locks
    let _sweeper = spawn_lock_sweeper(
        appointment_state.locks.clone(),
        Duration::from_secs(config.lock_sweep_interval_seconds.max(1)),
    );

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(config.clone(), schedule_state, appointment_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .await
        .context("server error")?;

    Ok(())
}
