//! Per-user async locks
//!
//! Serializes swaps for one user inside this process. Entries are dropped
//! once nobody holds or waits on them.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core_types::UserId;

type LockMap = DashMap<UserId, Arc<Mutex<()>>>;

#[derive(Default, Clone)]
pub struct UserLocks {
    locks: Arc<LockMap>,
}

pub struct UserLockGuard {
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: UserId) -> UserLockGuard {
        let mutex = self.locks.entry(user_id).or_default().value().clone();
        let guard = mutex.lock_owned().await;
        UserLockGuard {
            user_id,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Users with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, m| Arc::strong_count(m) == 1);
    }
}
