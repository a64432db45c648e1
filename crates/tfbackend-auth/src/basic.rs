use async_trait::async_trait;
use tfbackend_domain::State;

use crate::authenticator::Authenticator;
use crate::error::AuthError;

pub const NAME: &str = "basic";

/// Accepts any secret and namespaces the state under it.
///
/// The identity becomes `sha256("<secret>:<id>")`, so a state written with
/// one secret cannot be reached with another.
#[derive(Debug, Default, Clone)]
pub struct BasicAuth;

impl BasicAuth {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for BasicAuth {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn authenticate(&self, secret: &str, state: &mut State) -> Result<bool, AuthError> {
        state.id = state.id.scoped_to(secret);
        Ok(true)
    }
}
