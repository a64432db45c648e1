use async_trait::async_trait;
use tfbackend_domain::StateId;

use crate::error::StoreError;

/// Persists opaque state payloads keyed by [`StateId`].
///
/// Payloads are never interpreted. Saves overwrite (last write wins) and a
/// read after a save on the same instance sees that save.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn save_state(&self, id: &StateId, data: &[u8]) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when nothing was saved under `id`.
    async fn get_state(&self, id: &StateId) -> Result<Vec<u8>, StoreError>;

    /// Deleting a missing state is not an error.
    async fn delete_state(&self, id: &StateId) -> Result<(), StoreError>;
}
