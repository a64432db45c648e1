use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfbackend_domain::{LockInfo, StateId};
use tokio::sync::Mutex;

use crate::error::LockError;
use crate::locker::{decide_lock, LockOutcome, Locker, UnlockOutcome};

/// In-process [`Locker`]. One mutex serializes every call.
///
/// Only correct inside a single process; locks are lost on exit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLocker {
    locks: Arc<Mutex<HashMap<StateId, LockInfo>>>,
}

impl InMemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn lock(&self, id: &StateId, proposed: &LockInfo) -> Result<LockOutcome, LockError> {
        let mut locks = self.locks.lock().await;
        match locks.get(id) {
            Some(current) => Ok(decide_lock(current.clone(), proposed)),
            None => {
                locks.insert(id.clone(), proposed.clone());
                Ok(LockOutcome::Acquired)
            }
        }
    }

    async fn unlock(&self, id: &StateId, presented: &LockInfo) -> Result<UnlockOutcome, LockError> {
        let mut locks = self.locks.lock().await;
        match locks.get(id) {
            None => Ok(UnlockOutcome::Absent),
            Some(current) if current != presented => Ok(UnlockOutcome::Mismatch(current.clone())),
            Some(_) => {
                locks.remove(id);
                Ok(UnlockOutcome::Released)
            }
        }
    }

    async fn get_lock(&self, id: &StateId) -> Result<LockInfo, LockError> {
        let locks = self.locks.lock().await;
        locks
            .get(id)
            .cloned()
            .ok_or_else(|| LockError::NotFound(id.clone()))
    }
}
