//! Behaviour every [`StateStore`] backend has to share.

use tfbackend_domain::StateId;
use uuid::Uuid;

use crate::store::StateStore;

pub(crate) fn fresh_id() -> StateId {
    StateId::derive("conformance", &Uuid::new_v4().to_string())
}

pub(crate) async fn run(store: &dyn StateStore) {
    let id = fresh_id();

    assert!(store.get_state(&id).await.unwrap_err().is_not_found());

    store.save_state(&id, b"test").await.unwrap();
    assert_eq!(store.get_state(&id).await.unwrap(), b"test");

    store.save_state(&id, b"test2").await.unwrap();
    assert_eq!(store.get_state(&id).await.unwrap(), b"test2", "save must overwrite");

    let binary: Vec<u8> = (0..=255u8).rev().collect();
    store.save_state(&id, &binary).await.unwrap();
    assert_eq!(store.get_state(&id).await.unwrap(), binary, "payload must be opaque");

    store.save_state(&id, b"").await.unwrap();
    assert!(store.get_state(&id).await.unwrap().is_empty());

    store.delete_state(&id).await.unwrap();
    assert!(store.get_state(&id).await.unwrap_err().is_not_found());

    store.delete_state(&id).await.unwrap();

    let other = fresh_id();
    store.save_state(&id, b"one").await.unwrap();
    store.save_state(&other, b"two").await.unwrap();
    assert_eq!(store.get_state(&id).await.unwrap(), b"one");
    store.delete_state(&id).await.unwrap();
    store.delete_state(&other).await.unwrap();
}
