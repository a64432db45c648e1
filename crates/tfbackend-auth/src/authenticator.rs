use async_trait::async_trait;
use tfbackend_domain::State;

use crate::error::AuthError;

/// Decides whether a credential may access a state.
///
/// Implementations may rewrite `state.id`; every backend call after
/// authentication must use the rewritten identity.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn authenticate(&self, secret: &str, state: &mut State) -> Result<bool, AuthError>;
}
