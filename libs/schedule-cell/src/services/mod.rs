pub mod admin;
pub mod availability;
pub mod conflict;
pub mod resolver;
pub mod time;

pub use admin::ScheduleAdminService;
pub use availability::{compute_available_slots, AvailabilityService, BookingCalendar};
pub use conflict::ConflictValidator;
pub use resolver::{resolve_effective_schedule, ScheduleResolver};
pub use time::{ClockTime, TimeError, TimeRange};
