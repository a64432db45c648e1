use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use tfbackend_domain::{LockInfo, State as TfState};
use tfbackend_lock::{LockOutcome, UnlockOutcome};
use tracing::{debug, error, info, trace, warn};

use crate::auth::authenticate;
use crate::reply::Reply;
use crate::state::AppState;

/// Query parameter carrying the lock token on writes.
const LOCK_ID_PARAM: &str = "ID";

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Entry point for every request on `/state/:project/:name`.
///
/// Authenticates, dispatches on the method (case-sensitive, including the
/// LOCK/UNLOCK extension verbs) and emits exactly one response.
pub async fn state_request(
    State(app): State<AppState>,
    Path((project, name)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = TfState::new(project, name);

    info!(method = %method, path = %uri.path(), "state request");
    trace!(method = %method, path = %uri.path(), body = %String::from_utf8_lossy(&body), "request body");

    let reply = match authenticate(&app, &headers, &mut state).await {
        Ok(()) => dispatch(&app, &method, &query, &body, &mut state).await,
        Err(denied) => denied,
    };
    respond(&method, &uri, reply)
}

async fn dispatch(
    app: &AppState,
    method: &Method,
    query: &HashMap<String, String>,
    body: &[u8],
    state: &mut TfState,
) -> Reply {
    match method.as_str() {
        "LOCK" => lock(app, state, body).await,
        "UNLOCK" => unlock(app, state, body).await,
        "GET" => get(app, state).await,
        "POST" => {
            let token = query.get(LOCK_ID_PARAM).map(String::as_str).unwrap_or_default();
            post(app, state, token, body).await
        }
        "DELETE" => delete(app, state).await,
        other => {
            warn!(method = other, "unknown method called");
            Reply::text(StatusCode::NOT_IMPLEMENTED, "Not implemented")
        }
    }
}

/// The single exit point: every reply is logged here and nowhere else.
fn respond(method: &Method, uri: &Uri, reply: Reply) -> Response {
    debug!(
        status = reply.status.as_u16(),
        method = %method,
        path = %uri.path(),
        "response"
    );
    trace!(body = %String::from_utf8_lossy(&reply.body), "response body");
    axum::response::IntoResponse::into_response(reply)
}

async fn lock(app: &AppState, state: &mut TfState, body: &[u8]) -> Reply {
    debug!(state_id = %state.id, "try to lock state");

    state.lock = match LockInfo::from_json(body) {
        Ok(lock) => lock,
        Err(e) => {
            warn!(state_id = %state.id, error = %e, "rejecting lock request");
            return Reply::empty(StatusCode::BAD_REQUEST);
        }
    };

    match app.locker.lock(&state.id, &state.lock).await {
        Ok(LockOutcome::Acquired) => {
            debug!(state_id = %state.id, "state locked");
            Reply::ok()
        }
        Ok(LockOutcome::Held(current)) => {
            warn!(state_id = %state.id, holder = %current, "state is already locked");
            state.lock = current;
            Reply::with_lock(StatusCode::LOCKED, &state.lock)
        }
        Err(e) => {
            error!(state_id = %state.id, error = %e, "failed to lock state");
            Reply::empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn unlock(app: &AppState, state: &mut TfState, body: &[u8]) -> Reply {
    debug!(state_id = %state.id, "try to unlock state");

    state.lock = if body.is_empty() {
        LockInfo::default()
    } else {
        match LockInfo::from_json(body) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(state_id = %state.id, error = %e, "rejecting unlock request");
                return Reply::empty(StatusCode::BAD_REQUEST);
            }
        }
    };

    match app.locker.unlock(&state.id, &state.lock).await {
        Ok(UnlockOutcome::Released) => {
            debug!(state_id = %state.id, "state unlocked");
            Reply::ok()
        }
        Ok(UnlockOutcome::Mismatch(current)) => {
            warn!(state_id = %state.id, holder = %current, "failed to unlock state: locks not equal");
            state.lock = current;
            Reply::with_lock(StatusCode::BAD_REQUEST, &state.lock)
        }
        Ok(UnlockOutcome::Absent) => {
            warn!(state_id = %state.id, "failed to unlock state: not locked");
            Reply::with_lock(StatusCode::BAD_REQUEST, &state.lock)
        }
        Err(e) => {
            error!(state_id = %state.id, error = %e, "failed to unlock state");
            Reply::empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get(app: &AppState, state: &mut TfState) -> Reply {
    debug!(state_id = %state.id, "get state");

    state.data = match app.store.get_state(&state.id).await {
        Ok(data) => data,
        Err(e) if e.is_not_found() => {
            debug!(state_id = %state.id, "state does not exist");
            return Reply::text(StatusCode::NOT_FOUND, "state not found");
        }
        Err(e) => {
            warn!(state_id = %state.id, error = %e, "failed to get state");
            return Reply::text(StatusCode::BAD_REQUEST, "failed to read state");
        }
    };

    if let Some(kms) = &app.kms {
        if !state.data.is_empty() {
            state.data = match kms.decrypt(&state.data).await {
                Ok(plain) => plain,
                Err(e) => {
                    error!(state_id = %state.id, kms = kms.name(), error = %e, "failed to decrypt state");
                    return Reply::empty(StatusCode::INTERNAL_SERVER_ERROR);
                }
            };
        }
    }

    Reply::new(StatusCode::OK, std::mem::take(&mut state.data))
}

async fn post(app: &AppState, state: &mut TfState, token: &str, body: &[u8]) -> Reply {
    let current = match app.locker.get_lock(&state.id).await {
        Ok(current) => current,
        Err(e) => {
            warn!(state_id = %state.id, error = %e, "failed to get lock for state");
            return Reply::empty(StatusCode::BAD_REQUEST);
        }
    };
    if current.id != token {
        warn!(
            state_id = %state.id,
            presented = token,
            expected = %current.id,
            "attempting to write state with wrong lock"
        );
        return Reply::empty(StatusCode::BAD_REQUEST);
    }

    debug!(state_id = %state.id, bytes = body.len(), "save state");

    state.data = match &app.kms {
        Some(kms) => match kms.encrypt(body).await {
            Ok(sealed) => sealed,
            Err(e) => {
                error!(state_id = %state.id, kms = kms.name(), error = %e, "failed to encrypt state");
                return Reply::empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
        },
        None => body.to_vec(),
    };

    if let Err(e) = app.store.save_state(&state.id, &state.data).await {
        warn!(state_id = %state.id, store = app.store.name(), error = %e, "failed to save state");
        return Reply::text(StatusCode::BAD_REQUEST, "failed to save state");
    }

    Reply::ok()
}

async fn delete(app: &AppState, state: &TfState) -> Reply {
    debug!(state_id = %state.id, "delete state");

    match app.store.delete_state(&state.id).await {
        Ok(()) => Reply::ok(),
        Err(e) => {
            warn!(state_id = %state.id, error = %e, "failed to delete state");
            Reply::empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
