use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;

use crate::error::KmsError;
use crate::kms::Kms;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM with a key supplied out of band.
///
/// Sealed layout: `nonce (12) || ciphertext || tag (16)`. Every call draws a
/// fresh random nonce.
pub struct LocalKms {
    cipher: Aes256Gcm,
}

impl LocalKms {
    /// Build from a base64 encoded 32-byte key, as produced by [`generate_key`].
    pub fn new(key: &str) -> Result<Self, KmsError> {
        let raw = BASE64
            .decode(key.trim())
            .map_err(|e| KmsError::InvalidKey(format!("not base64: {e}")))?;
        if raw.len() != KEY_LEN {
            return Err(KmsError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&raw)
            .map_err(|e| KmsError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| KmsError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, KmsError> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(KmsError::Truncated { len: data.len(), min: NONCE_LEN + TAG_LEN });
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| KmsError::Open)
    }
}

/// Generate a random key for [`LocalKms`], base64 encoded for configuration.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}

#[async_trait]
impl Kms for LocalKms {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        self.seal(plaintext)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError> {
        self.open(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: &str = "x8DiIkAKRQT7cF55NQLkAZk637W3bGVOUjGeMX5ZGXY=";

    fn kms() -> LocalKms {
        LocalKms::new(KEY).unwrap()
    }

    #[test]
    fn generated_key_is_accepted() {
        let key = generate_key();
        assert!(LocalKms::new(&key).is_ok());
        assert_ne!(key, generate_key());
    }

    #[test]
    fn rejects_short_key() {
        let short = BASE64.encode([0u8; 16]);
        assert!(matches!(LocalKms::new(&short), Err(KmsError::InvalidKey(_))));
        assert!(matches!(LocalKms::new("%%%"), Err(KmsError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn round_trip_through_trait() {
        let k = kms();
        let sealed = k.encrypt(b"terraform state").await.unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"terraform state");
        assert_eq!(k.decrypt(&sealed).await.unwrap(), b"terraform state");
    }

    #[test]
    fn empty_payload_round_trips() {
        let k = kms();
        let sealed = k.seal(b"").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + TAG_LEN);
        assert!(k.open(&sealed).unwrap().is_empty());
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let k = kms();
        let a = k.seal(b"same").unwrap();
        let b = k.seal(b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn truncated_input_fails() {
        let k = kms();
        assert!(matches!(k.open(b""), Err(KmsError::Truncated { .. })));
        assert!(matches!(k.open(&[0u8; NONCE_LEN]), Err(KmsError::Truncated { .. })));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = kms().seal(b"secret").unwrap();
        let other = LocalKms::new(&generate_key()).unwrap();
        assert!(matches!(other.open(&sealed), Err(KmsError::Open)));
    }

    proptest! {
        #[test]
        fn any_payload_round_trips(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let k = kms();
            let sealed = k.seal(&payload).unwrap();
            prop_assert_eq!(k.open(&sealed).unwrap(), payload);
        }

        #[test]
        fn any_single_byte_flip_is_rejected(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            pos in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let k = kms();
            let mut sealed = k.seal(&payload).unwrap();
            let i = pos.index(sealed.len());
            sealed[i] ^= flip;
            prop_assert!(k.open(&sealed).is_err());
        }
    }
}
