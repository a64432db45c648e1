use axum::http::{header, HeaderMap, StatusCode};
use tfbackend_domain::State;
use tracing::warn;

use crate::reply::Reply;
use crate::state::AppState;

const DENIED: &str = "Permission denied";

/// Run the authenticator selected by the basic-auth username.
///
/// Fails closed with 403 on a missing header, an unknown backend, any
/// authenticator error, or an explicit deny. The body is always the same;
/// the reason only goes to the log. On success `state.id` may have been
/// rewritten and must be used from here on.
pub async fn authenticate(app: &AppState, headers: &HeaderMap, state: &mut State) -> Result<(), Reply> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match app.auth.authenticate(authorization, state).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(state_id = %state.id, "failed to authenticate request");
            Err(Reply::text(StatusCode::FORBIDDEN, DENIED))
        }
        Err(e) => {
            warn!(state_id = %state.id, error = %e, "failed to process authentication");
            Err(Reply::text(StatusCode::FORBIDDEN, DENIED))
        }
    }
}
