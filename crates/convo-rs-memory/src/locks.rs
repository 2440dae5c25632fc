//! Per-user writer locks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of per-user async mutexes, created on demand.
///
/// The outer mutex only guards the table itself and is never held across an
/// await point. Entries are removed when the last guard for a user drops and
/// nobody else is waiting.
#[derive(Debug, Default)]
pub(crate) struct UserLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one user; releases its table entry on drop.
pub(crate) struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.user_id);
    }
}

impl UserLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn handle(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        self.table
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn guard(&self, user_id: &str, guard: OwnedMutexGuard<()>) -> UserGuard<'_> {
        UserGuard {
            locks: self,
            user_id: user_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Wait for exclusive access to a user.
    pub(crate) async fn lock(&self, user_id: &str) -> UserGuard<'_> {
        let guard = self.handle(user_id).lock_owned().await;
        self.guard(user_id, guard)
    }

    /// Take exclusive access only if no writer currently holds it.
    pub(crate) fn try_lock(&self, user_id: &str) -> Option<UserGuard<'_>> {
        match self.handle(user_id).try_lock_owned() {
            Ok(guard) => Some(self.guard(user_id, guard)),
            Err(_) => {
                self.release(user_id);
                None
            }
        }
    }

    /// Remove a user's entry if only the table still references it.
    fn release(&self, user_id: &str) {
        let mut table = self.table.lock();
        if let Some(lock) = table.get(user_id)
            && Arc::strong_count(lock) == 1
        {
            table.remove(user_id);
        }
    }

    /// Drop entries nobody holds or waits on. Returns how many were removed.
    pub(crate) fn prune(&self) -> usize {
        let mut table = self.table.lock();
        let before = table.len();
        table.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - table.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().len()
    }
}
