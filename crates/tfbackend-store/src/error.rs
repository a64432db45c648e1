use std::path::PathBuf;
use std::time::Duration;

use tfbackend_domain::StateId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state {0} does not exist")]
    NotFound(StateId),

    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage did not answer within {0:?}")]
    Timeout(Duration),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
