use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tfbackend_domain::State;
use tracing::debug;

use crate::authenticator::Authenticator;
use crate::error::AuthError;

pub const NAME: &str = "github_pat";

const GITHUB_API: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

/// Authorizes GitHub personal access tokens against one organization.
///
/// Access is granted when the token can read the repository named after the
/// project inside the organization, when the token's user is the
/// organization itself, or when the user is a member of it.
pub struct GithubPatAuth {
    org: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Identity {
    login: String,
}

impl GithubPatAuth {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            api_base: GITHUB_API.into(),
            http: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_api_base(org: &str, api_base: &str) -> Self {
        Self {
            org: org.into(),
            api_base: api_base.trim_end_matches('/').into(),
            http: reqwest::Client::new(),
        }
    }

    /// API url from raw segments; each one is percent-encoded, `/` included.
    fn url(&self, segments: &[&str]) -> Result<Url, AuthError> {
        let bad_base = || AuthError::Transport(format!("invalid GitHub API base {}", self.api_base));
        let mut url = Url::parse(&self.api_base).map_err(|_| bad_base())?;
        url.path_segments_mut()
            .map_err(|_| bad_base())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str], token: &str) -> Result<reqwest::Response, AuthError> {
        let url = self.url(segments)?;
        let resp = self
            .http
            .get(url.clone())
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {token}"))
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", "tfbackend")
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AuthError::Remote {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, segments: &[&str], token: &str) -> Result<T, AuthError> {
        self.get(segments, token)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AuthError::Transport(format!("decoding /{}: {e}", segments.join("/"))))
    }
}

#[async_trait]
impl Authenticator for GithubPatAuth {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn authenticate(&self, secret: &str, state: &mut State) -> Result<bool, AuthError> {
        // `.` and `..` would be dropped as segments and resolve elsewhere.
        if !matches!(state.project.as_str(), "" | "." | "..") {
            match self.get(&["repos", &self.org, &state.project], secret).await {
                Ok(_) => return Ok(true),
                Err(e) => debug!(error = %e, "repository not readable, checking user"),
            }
        }

        let user: Identity = self.get_json(&["user"], secret).await?;
        if user.login == self.org {
            return Ok(true);
        }

        let orgs: Vec<Identity> = self.get_json(&["user", "orgs"], secret).await?;
        Ok(orgs.iter().any(|o| o.login == self.org))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn github() -> MockServer {
        MockServer::start().await
    }

    async fn respond(server: &MockServer, route: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn readable_repository_is_enough() {
        let server = github().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/infra"))
            .and(header("Authorization", "Bearer ghp_token"))
            .and(header("X-GitHub-Api-Version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "full_name": "acme/infra" })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = GithubPatAuth::with_api_base("acme", &server.uri());
        let mut state = State::new("infra", "prod");
        assert!(auth.authenticate("ghp_token", &mut state).await.unwrap());
    }

    #[tokio::test]
    async fn personal_account_matching_org_is_allowed() {
        let server = github().await;
        respond(&server, "/repos/alice/infra", 404, json!({ "message": "Not Found" })).await;
        respond(&server, "/user", 200, json!({ "login": "alice" })).await;

        let auth = GithubPatAuth::with_api_base("alice", &server.uri());
        assert!(auth.authenticate("t", &mut State::new("infra", "prod")).await.unwrap());
    }

    #[tokio::test]
    async fn org_member_is_allowed() {
        let server = github().await;
        respond(&server, "/repos/acme/infra", 404, json!({})).await;
        respond(&server, "/user", 200, json!({ "login": "bob" })).await;
        respond(&server, "/user/orgs", 200, json!([{ "login": "other" }, { "login": "acme" }])).await;

        let auth = GithubPatAuth::with_api_base("acme", &server.uri());
        assert!(auth.authenticate("t", &mut State::new("infra", "prod")).await.unwrap());
    }

    #[tokio::test]
    async fn outsider_is_denied() {
        let server = github().await;
        respond(&server, "/repos/acme/infra", 404, json!({})).await;
        respond(&server, "/user", 200, json!({ "login": "mallory" })).await;
        respond(&server, "/user/orgs", 200, json!([{ "login": "other" }])).await;

        let auth = GithubPatAuth::with_api_base("acme", &server.uri());
        assert!(!auth.authenticate("t", &mut State::new("infra", "prod")).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_token_is_an_error() {
        let server = github().await;
        respond(&server, "/repos/acme/infra", 401, json!({ "message": "Bad credentials" })).await;
        respond(&server, "/user", 401, json!({ "message": "Bad credentials" })).await;

        let auth = GithubPatAuth::with_api_base("acme", &server.uri());
        let err = auth.authenticate("bad", &mut State::new("infra", "prod")).await.unwrap_err();
        assert!(matches!(err, AuthError::Remote { status: 401, .. }));
    }

    #[tokio::test]
    async fn project_cannot_escape_the_repository_path() {
        let server = github().await;
        respond(&server, "/user", 200, json!({ "login": "mallory" })).await;
        respond(&server, "/user/orgs", 200, json!([])).await;

        let auth = GithubPatAuth::with_api_base("acme", &server.uri());
        for project in ["../../user", "..", "a/../../../user"] {
            let mut state = State::new(project, "prod");
            assert!(!auth.authenticate("t", &mut state).await.unwrap(), "{project}");
        }

        let requested: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert!(requested.contains(&"/repos/acme/..%2F..%2Fuser".to_string()), "{requested:?}");
    }
}
