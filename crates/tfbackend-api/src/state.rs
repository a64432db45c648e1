use std::sync::Arc;

use tfbackend_auth::AuthRegistry;
use tfbackend_kms::Kms;
use tfbackend_lock::Locker;
use tfbackend_store::StateStore;

/// Backends chosen at startup, shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub locker: Arc<dyn Locker>,
    /// `None` stores states as plaintext.
    pub kms: Option<Arc<dyn Kms>>,
    pub auth: Arc<AuthRegistry>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn StateStore>,
        locker: Arc<dyn Locker>,
        kms: Option<Arc<dyn Kms>>,
        auth: AuthRegistry,
    ) -> Self {
        Self { store, locker, kms, auth: Arc::new(auth) }
    }
}
