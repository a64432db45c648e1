use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tfbackend_domain::LockInfo;
use tracing::error;

/// The one status and body a state request ends with.
///
/// Handlers build a `Reply`; only the dispatcher turns it into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub fn ok() -> Self {
        Self::empty(StatusCode::OK)
    }

    pub fn empty(status: StatusCode) -> Self {
        Self { status, body: Vec::new() }
    }

    pub fn text(status: StatusCode, message: &str) -> Self {
        Self { status, body: message.as_bytes().to_vec() }
    }

    /// `status` with the serialized lock as body, so the client can show the holder.
    pub fn with_lock(status: StatusCode, lock: &LockInfo) -> Self {
        match lock.to_json() {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!(error = %e, "failed to serialize lock info");
                Self::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}
