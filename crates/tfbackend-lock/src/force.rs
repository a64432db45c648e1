use std::sync::Arc;

use async_trait::async_trait;
use tfbackend_domain::{LockInfo, StateId};
use tracing::info;

use crate::error::LockError;
use crate::locker::{LockOutcome, Locker, UnlockOutcome};

/// Lets an UNLOCK without a token clear whatever lock is currently held.
///
/// An anonymous presented lock is replaced by the stored one before the call
/// reaches the wrapped backend, so the release still goes through the
/// backend's equality-gated delete.
pub struct ForceUnlock {
    inner: Arc<dyn Locker>,
}

impl ForceUnlock {
    pub fn new(inner: Arc<dyn Locker>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Locker for ForceUnlock {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn lock(&self, id: &StateId, proposed: &LockInfo) -> Result<LockOutcome, LockError> {
        self.inner.lock(id, proposed).await
    }

    async fn unlock(&self, id: &StateId, presented: &LockInfo) -> Result<UnlockOutcome, LockError> {
        if !presented.is_anonymous() {
            return self.inner.unlock(id, presented).await;
        }

        let current = match self.inner.get_lock(id).await {
            Ok(current) => current,
            Err(e) if e.is_not_found() => return Ok(UnlockOutcome::Absent),
            Err(e) => return Err(e),
        };

        info!(state_id = %id, lock = %current, "force unlocking state");
        self.inner.unlock(id, &current).await
    }

    async fn get_lock(&self, id: &StateId) -> Result<LockInfo, LockError> {
        self.inner.get_lock(id).await
    }
}
