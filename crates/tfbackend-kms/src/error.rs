use thiserror::Error;

#[derive(Debug, Error)]
pub enum KmsError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("ciphertext too short: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    #[error("failed to seal payload")]
    Seal,

    #[error("failed to open payload: authentication failed")]
    Open,

    #[error("vault request to {path} failed with status {status}: {message}")]
    Remote { path: String, status: u16, message: String },

    #[error("vault transport error: {0}")]
    Transport(String),

    #[error("malformed vault response: {0}")]
    MalformedResponse(String),

    #[error("vault login failed: {0}")]
    Login(String),
}
