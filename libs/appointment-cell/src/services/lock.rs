// libs/appointment-cell/src/services/lock.rs
//
// Advisory per-slot booking lock. It narrows the window in which two clients
// race for the same slot; the unique index on appointments stays the final
// arbiter whether or not the lock holds.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use schedule_cell::StoreError;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::clock::SharedClock;

use crate::models::{BookingError, BookingLock, SlotKey};

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert-if-absent. `Ok(false)` when a lock for the same slot already exists.
    async fn try_insert(&self, lock: &BookingLock) -> Result<bool, StoreError>;

    async fn find(&self, key: &SlotKey) -> Result<Option<BookingLock>, StoreError>;

    /// Deleting a missing lock is not an error.
    async fn delete(&self, lock_id: Uuid) -> Result<(), StoreError>;

    /// Removes every lock with `expires_at <= now`, returning how many went.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

// ==============================================================================
// STORES
// ==============================================================================

/// `booking_locks` on Supabase.
pub struct SupabaseLockStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseLockStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl LockStore for SupabaseLockStore {
    async fn try_insert(&self, lock: &BookingLock) -> Result<bool, StoreError> {
        let body = serde_json::to_value(lock).map_err(|e| StoreError::Backend(e.to_string()))?;
        let result: Result<Vec<BookingLock>, _> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/booking_locks",
                None,
                Some(body),
                Some(SupabaseClient::representation_headers()),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, key: &SlotKey) -> Result<Option<BookingLock>, StoreError> {
        let path = format!(
            "/rest/v1/booking_locks?specialist_id=eq.{}&appointment_date=eq.{}&appointment_time=eq.{}",
            key.specialist_id, key.appointment_date, key.appointment_time
        );
        let rows: Vec<BookingLock> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, lock_id: Uuid) -> Result<(), StoreError> {
        let path = format!("/rest/v1/booking_locks?id=eq.{}", lock_id);
        self.supabase.execute(Method::DELETE, &path, None, None).await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let path = format!(
            "/rest/v1/booking_locks?expires_at=lte.{}",
            now.to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        let rows: Vec<serde_json::Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                None,
                Some(SupabaseClient::representation_headers()),
            )
            .await?;
        Ok(rows.len())
    }
}

#[derive(Default)]
pub struct InMemoryLockStore {
    locks: Mutex<HashMap<SlotKey, BookingLock>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_insert(&self, lock: &BookingLock) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().await;
        if locks.contains_key(&lock.key()) {
            return Ok(false);
        }
        locks.insert(lock.key(), lock.clone());
        Ok(true)
    }

    async fn find(&self, key: &SlotKey) -> Result<Option<BookingLock>, StoreError> {
        Ok(self.locks.lock().await.get(key).cloned())
    }

    async fn delete(&self, lock_id: Uuid) -> Result<(), StoreError> {
        self.locks.lock().await.retain(|_, lock| lock.id != lock_id);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| !lock.is_expired(now));
        Ok(before - locks.len())
    }
}

// ==============================================================================
// GUARD
// ==============================================================================

pub struct BookingLockGuard {
    store: Arc<dyn LockStore>,
    clock: SharedClock,
    ttl: Duration,
}

impl BookingLockGuard {
    pub fn new(store: Arc<dyn LockStore>, clock: SharedClock, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn from_config(store: Arc<dyn LockStore>, clock: SharedClock, config: &AppConfig) -> Self {
        Self::new(store, clock, Duration::seconds(config.booking_lock_ttl_seconds))
    }

    /// Takes the lock for `key` or fails with [`BookingError::LockHeld`].
    /// Never waits or retries on a live lock; an expired one is removed and
    /// the insert retried once.
    #[instrument(skip(self), fields(slot = %key))]
    pub async fn acquire(&self, key: SlotKey, client_id: &str) -> Result<LockHandle, BookingError> {
        if let Err(e) = self.sweep_expired().await {
            warn!("Lazy lock sweep failed, continuing: {}", e);
        }

        let now = self.clock.now();
        let lock = BookingLock::new(key, client_id, now, self.ttl);
        if self.store.try_insert(&lock).await? {
            debug!("Lock {} acquired by {}", lock.id, client_id);
            return Ok(self.handle(lock));
        }

        match self.store.find(&key).await? {
            Some(existing) if !existing.is_expired(now) => {
                debug!("Slot {} held by {} until {}", key, existing.locked_by, existing.expires_at);
                return Err(BookingError::LockHeld { key, expires_at: existing.expires_at });
            }
            Some(stale) => {
                info!("Removing expired lock {} on {}", stale.id, key);
                self.store.delete(stale.id).await?;
            }
            None => {}
        }

        if self.store.try_insert(&lock).await? {
            debug!("Lock {} acquired by {} on retry", lock.id, client_id);
            return Ok(self.handle(lock));
        }

        let expires_at = self
            .store
            .find(&key)
            .await?
            .map(|l| l.expires_at)
            .unwrap_or(lock.expires_at);
        Err(BookingError::LockHeld { key, expires_at })
    }

    /// Idempotent.
    pub async fn release(&self, lock_id: Uuid) -> Result<(), BookingError> {
        self.store.delete(lock_id).await?;
        debug!("Lock {} released", lock_id);
        Ok(())
    }

    /// Runs `operation` while holding the lock for `key`. The lock is released
    /// on every exit path; if this future is dropped mid-operation the handle's
    /// `Drop` schedules the release instead.
    pub async fn with_lock<T, F, Fut>(
        &self,
        key: SlotKey,
        client_id: &str,
        operation: F,
    ) -> Result<T, BookingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let handle = self.acquire(key, client_id).await?;
        let result = operation().await;

        if let Err(e) = handle.release().await {
            warn!("Failed to release lock on {}, it will expire: {}", key, e);
        }
        result
    }

    pub async fn sweep_expired(&self) -> Result<usize, BookingError> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        if removed > 0 {
            info!("Swept {} expired booking lock(s)", removed);
        }
        Ok(removed)
    }

    fn handle(&self, lock: BookingLock) -> LockHandle {
        LockHandle {
            lock,
            store: self.store.clone(),
            released: false,
        }
    }
}

/// A held lock. Release explicitly; dropping it unreleased releases in the background.
pub struct LockHandle {
    lock: BookingLock,
    store: Arc<dyn LockStore>,
    released: bool,
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("lock", &self.lock)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LockHandle {
    pub fn lock(&self) -> &BookingLock {
        &self.lock
    }

    pub async fn release(mut self) -> Result<(), BookingError> {
        self.store.delete(self.lock.id).await?;
        self.released = true;
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Lock {} dropped outside a runtime, leaving it to expire", self.lock.id);
            return;
        };

        let store = self.store.clone();
        let lock_id = self.lock.id;
        runtime.spawn(async move {
            if let Err(e) = store.delete(lock_id).await {
                warn!("Background release of lock {} failed: {}", lock_id, e);
            }
        });
    }
}
