use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("malformed lock info: {0}")]
    MalformedLockInfo(#[source] serde_json::Error),

    #[error("lock info could not be serialized: {0}")]
    LockInfoEncoding(#[source] serde_json::Error),
}
