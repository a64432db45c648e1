use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no basic auth header found")]
    MissingCredentials,

    #[error("malformed authorization header: {0}")]
    MalformedHeader(String),

    #[error("auth backend '{0}' is not enabled")]
    UnknownBackend(String),

    #[error("token rejected: {0}")]
    InvalidToken(String),

    #[error("issuer discovery failed: {0}")]
    Discovery(String),

    #[error("request to {url} failed with status {status}")]
    Remote { url: String, status: u16 },

    #[error("auth transport error: {0}")]
    Transport(String),
}
