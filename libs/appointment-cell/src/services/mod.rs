pub mod booking;
pub mod lifecycle;
pub mod lock;
pub mod notification;
pub mod sweeper;

pub use booking::BookingService;
pub use lifecycle::AppointmentLifecycleService;
pub use lock::{BookingLockGuard, InMemoryLockStore, LockHandle, LockStore, SupabaseLockStore};
pub use notification::{notifier_from_config, LogNotifier, Notifier, WebhookNotifier};
pub use sweeper::{run_lock_sweeper, spawn_lock_sweeper};
