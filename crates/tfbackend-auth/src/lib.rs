pub mod authenticator;
pub mod basic;
pub mod error;
pub mod github;
pub mod jwt;
pub mod registry;

pub use authenticator::Authenticator;
pub use basic::BasicAuth;
pub use error::AuthError;
pub use github::GithubPatAuth;
pub use jwt::JwtAuth;
pub use registry::{parse_basic_auth, AuthRegistry};
