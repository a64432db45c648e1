use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tfbackend_domain::State;

use crate::authenticator::Authenticator;
use crate::error::AuthError;

/// Dispatches a request to the [`Authenticator`] named by its basic-auth
/// username. The password is the credential handed to that authenticator.
///
/// Names that were never registered (or were disabled in config) are
/// rejected with [`AuthError::UnknownBackend`].
#[derive(Default, Clone)]
pub struct AuthRegistry {
    authenticators: HashMap<&'static str, Arc<dyn Authenticator>>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the authenticator's own name. Returns `&mut self` for chaining.
    pub fn register(&mut self, authenticator: Arc<dyn Authenticator>) -> &mut Self {
        self.authenticators.insert(authenticator.name(), authenticator);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Authenticator>, AuthError> {
        self.authenticators
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::UnknownBackend(name.to_string()))
    }

    /// Names of all registered authenticators, sorted.
    pub fn enabled(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.authenticators.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Authenticate from a raw `Authorization` header value.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        state: &mut State,
    ) -> Result<bool, AuthError> {
        let header = authorization.ok_or(AuthError::MissingCredentials)?;
        let (backend, secret) = parse_basic_auth(header)?;
        self.get(&backend)?.authenticate(&secret, state).await
    }
}

/// Split `Basic base64(user:password)` into `(user, password)`.
///
/// The password may itself contain `:`; only the first one separates.
pub fn parse_basic_auth(header: &str) -> Result<(String, String), AuthError> {
    let (scheme, encoded) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MissingCredentials)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::MissingCredentials);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| AuthError::MalformedHeader(e.to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AuthError::MalformedHeader("credentials are not utf-8".into()))?;
    let (user, password) = decoded
        .split_once(':')
        .ok_or_else(|| AuthError::MalformedHeader("missing ':' separator".into()))?;
    Ok((user.to_string(), password.to_string()))
}
