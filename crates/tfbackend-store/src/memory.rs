use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tfbackend_domain::StateId;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::StateStore;

/// In-memory implementation of [`StateStore`].
///
/// All data is lost on process exit. Suitable for tests and single-process
/// experiments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    states: Arc<RwLock<HashMap<StateId, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save_state(&self, id: &StateId, data: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.states.write().await;
        guard.insert(id.clone(), data.to_vec());
        Ok(())
    }

    async fn get_state(&self, id: &StateId) -> Result<Vec<u8>, StoreError> {
        let guard = self.states.read().await;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn delete_state(&self, id: &StateId) -> Result<(), StoreError> {
        let mut guard = self.states.write().await;
        guard.remove(id);
        Ok(())
    }
}
