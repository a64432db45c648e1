use async_trait::async_trait;
use tfbackend_domain::{LockInfo, StateId};

use crate::error::LockError;

/// Result of a [`Locker::lock`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller holds the lock, either freshly or because the stored lock
    /// is structurally equal to the proposed one.
    Acquired,
    /// Somebody else holds it. Carries the current holder.
    Held(LockInfo),
}

/// Result of a [`Locker::unlock`] call. Only `Released` mutates anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    Released,
    /// Nothing was locked.
    Absent,
    /// A different lock is held. Carries the current holder.
    Mismatch(LockInfo),
}

/// At-most-one-holder advisory lock keyed by [`StateId`].
///
/// Every backend answers with the same outcomes; backend specific failures
/// are folded into [`LockError`] before they leave the implementation.
#[async_trait]
pub trait Locker: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn lock(&self, id: &StateId, proposed: &LockInfo) -> Result<LockOutcome, LockError>;

    async fn unlock(&self, id: &StateId, presented: &LockInfo) -> Result<UnlockOutcome, LockError>;

    /// Fails with [`LockError::NotFound`] when no lock is held.
    async fn get_lock(&self, id: &StateId) -> Result<LockInfo, LockError>;
}

/// Shared decision for "a lock is stored, somebody proposes another one".
pub(crate) fn decide_lock(current: LockInfo, proposed: &LockInfo) -> LockOutcome {
    if current == *proposed {
        LockOutcome::Acquired
    } else {
        LockOutcome::Held(current)
    }
}
