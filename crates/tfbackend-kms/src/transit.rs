use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

use crate::error::KmsError;
use crate::kms::Kms;
use crate::vault::VaultClient;

/// Delegates encryption to a Vault transit engine.
///
/// Every call is a round trip; no key material is held locally. The stored
/// payload is the transit ciphertext token (`vault:v1:...`) as bytes.
pub struct VaultTransit {
    vault: VaultClient,
    engine: String,
    key: String,
}

impl VaultTransit {
    pub fn new(vault: VaultClient, engine: impl Into<String>, key: impl Into<String>) -> Self {
        Self { vault, engine: engine.into(), key: key.into() }
    }
}

#[async_trait]
impl Kms for VaultTransit {
    fn name(&self) -> &'static str {
        "transit"
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let path = format!("{}/encrypt/{}", self.engine, self.key);
        let resp = self
            .vault
            .write(&path, &json!({ "plaintext": BASE64.encode(plaintext) }))
            .await?;

        resp["data"]["ciphertext"]
            .as_str()
            .map(|c| c.as_bytes().to_vec())
            .ok_or_else(|| KmsError::MalformedResponse("transit response has no ciphertext".into()))
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let token = std::str::from_utf8(ciphertext)
            .map_err(|_| KmsError::MalformedResponse("stored ciphertext is not a transit token".into()))?;

        let path = format!("{}/decrypt/{}", self.engine, self.key);
        let resp = self.vault.write(&path, &json!({ "ciphertext": token })).await?;

        let plaintext = resp["data"]["plaintext"]
            .as_str()
            .ok_or_else(|| KmsError::MalformedResponse("transit response has no plaintext".into()))?;

        BASE64
            .decode(plaintext)
            .map_err(|e| KmsError::MalformedResponse(format!("plaintext is not base64: {e}")))
    }
}
