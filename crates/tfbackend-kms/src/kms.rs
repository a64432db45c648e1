use async_trait::async_trait;

use crate::error::KmsError;

/// Encryption-at-rest boundary between the dispatcher and storage.
///
/// Implementations are stateless from the caller's view: no sessions, no
/// per-call setup the caller has to manage.
#[async_trait]
pub trait Kms: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError>;

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError>;
}
