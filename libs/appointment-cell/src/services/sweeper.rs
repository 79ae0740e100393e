use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lock::BookingLockGuard;

/// Background task that periodically removes expired booking locks.
pub async fn run_lock_sweeper(guard: Arc<BookingLockGuard>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match guard.sweep_expired().await {
            Ok(0) => debug!("lock sweep: nothing expired"),
            Ok(removed) => debug!("lock sweep removed {removed} lock(s)"),
            Err(e) => warn!("lock sweep failed: {e}"),
        }
    }
}

pub fn spawn_lock_sweeper(guard: Arc<BookingLockGuard>, every: Duration) -> JoinHandle<()> {
    info!("Starting booking lock sweeper every {:?}", every);
    tokio::spawn(run_lock_sweeper(guard, every))
}
