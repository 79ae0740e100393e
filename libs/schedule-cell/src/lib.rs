pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use handlers::ScheduleState;
pub use models::*;
pub use router::schedule_routes;
pub use services::*;
pub use store::{
    AppointmentStore, InMemoryAppointmentStore, InMemoryScheduleStore, ScheduleStore, StoreError,
    SupabaseAppointmentStore, SupabaseScheduleStore,
};
