//! Behaviour every [`Locker`] backend has to share.

use std::sync::Arc;

use tfbackend_domain::{LockInfo, StateId};
use uuid::Uuid;

use crate::locker::{LockOutcome, Locker, UnlockOutcome};

pub(crate) fn lock_info() -> LockInfo {
    LockInfo {
        id: Uuid::new_v4().to_string(),
        path: String::new(),
        operation: "OperationTypeApply".into(),
        who: "conformance@test".into(),
        version: "1.9.0".into(),
        created: chrono::Utc::now().to_rfc3339(),
        info: String::new(),
    }
}

pub(crate) fn fresh_id() -> StateId {
    StateId::derive("conformance", &Uuid::new_v4().to_string())
}

pub(crate) async fn run(locker: &dyn Locker) {
    let id = fresh_id();
    let first = lock_info();
    let second = lock_info();

    assert!(locker.get_lock(&id).await.unwrap_err().is_not_found());
    assert_eq!(locker.unlock(&id, &first).await.unwrap(), UnlockOutcome::Absent);

    assert_eq!(locker.lock(&id, &first).await.unwrap(), LockOutcome::Acquired);
    assert_eq!(locker.get_lock(&id).await.unwrap(), first);

    assert_eq!(
        locker.lock(&id, &first).await.unwrap(),
        LockOutcome::Acquired,
        "re-lock by the same holder must succeed"
    );

    assert_eq!(
        locker.lock(&id, &second).await.unwrap(),
        LockOutcome::Held(first.clone()),
        "a competing lock must see the current holder"
    );

    let mut same_token = first.clone();
    same_token.who = "mallory@elsewhere".into();
    assert_eq!(
        locker.lock(&id, &same_token).await.unwrap(),
        LockOutcome::Held(first.clone())
    );

    assert_eq!(
        locker.unlock(&id, &second).await.unwrap(),
        UnlockOutcome::Mismatch(first.clone())
    );
    assert_eq!(locker.get_lock(&id).await.unwrap(), first, "failed unlock must not mutate");

    assert_eq!(locker.unlock(&id, &first).await.unwrap(), UnlockOutcome::Released);
    assert!(locker.get_lock(&id).await.unwrap_err().is_not_found());

    assert_eq!(locker.lock(&id, &second).await.unwrap(), LockOutcome::Acquired);
    assert_eq!(locker.unlock(&id, &second).await.unwrap(), UnlockOutcome::Released);
}

pub(crate) async fn single_winner(locker: Arc<dyn Locker>) {
    let id = fresh_id();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let locker = locker.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let info = lock_info();
            let outcome = locker.lock(&id, &info).await.unwrap();
            (outcome, info)
        }));
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            (LockOutcome::Acquired, info) => winners.push(info),
            (LockOutcome::Held(current), _) => losers.push(current),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one concurrent locker may win");
    assert!(losers.iter().all(|held| *held == winners[0]));

    assert_eq!(locker.unlock(&id, &winners[0]).await.unwrap(), UnlockOutcome::Released);
}
