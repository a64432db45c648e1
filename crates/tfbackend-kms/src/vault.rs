use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::KmsError;

pub const K8S_SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

// ── Configuration ─────────────────────────────────────────────────────────────

/// How to reach and log in to Vault. Resolved once at startup.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Base address, e.g. `https://vault.example.com:8200`.
    pub addr: String,
    /// Static token. Takes precedence over Kubernetes login.
    pub token: Option<String>,
    /// Enterprise namespace sent as `X-Vault-Namespace`.
    pub namespace: Option<String>,
    /// Role for the Kubernetes auth method.
    pub kube_auth_role: Option<String>,
    /// Mount name of the Kubernetes auth method.
    pub kube_auth_name: String,
    /// Service account JWT presented at Kubernetes login.
    pub service_account_token_path: PathBuf,
}

impl VaultConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: None,
            namespace: None,
            kube_auth_role: None,
            kube_auth_name: "kubernetes".into(),
            service_account_token_path: PathBuf::from(K8S_SERVICE_ACCOUNT_TOKEN),
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Minimal Vault HTTP API client: logical reads and writes under `/v1`.
#[derive(Clone)]
pub struct VaultClient {
    client: reqwest::Client,
    addr: String,
    token: String,
    namespace: Option<String>,
}

impl VaultClient {
    /// Build a client and authenticate it.
    ///
    /// Uses the static token when present, otherwise logs in with the
    /// Kubernetes service account.
    pub async fn connect(config: &VaultConfig) -> Result<Self, KmsError> {
        if config.addr.is_empty() {
            return Err(KmsError::Login("no vault address defined".into()));
        }

        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Self::with_token(&config.addr, token, config.namespace.clone()));
        }

        let role = config
            .kube_auth_role
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| KmsError::Login("no login method found".into()))?;

        let jwt = tokio::fs::read_to_string(&config.service_account_token_path)
            .await
            .map_err(|e| {
                KmsError::Login(format!(
                    "read service account token {}: {e}",
                    config.service_account_token_path.display()
                ))
            })?;

        let anonymous = Self::with_token(&config.addr, "", config.namespace.clone());
        let path = format!("auth/{}/login", config.kube_auth_name);
        let resp = anonymous
            .write(&path, &json!({ "jwt": jwt.trim(), "role": role }))
            .await
            .map_err(|e| KmsError::Login(e.to_string()))?;

        let token = resp["auth"]["client_token"]
            .as_str()
            .ok_or_else(|| KmsError::Login("response carries no client token".into()))?;

        info!(role, mount = %config.kube_auth_name, "logged in to vault with kubernetes service account");
        Ok(Self::with_token(&config.addr, token, config.namespace.clone()))
    }

    pub fn with_token(addr: &str, token: &str, namespace: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            addr: addr.trim_end_matches('/').to_string(),
            token: token.to_string(),
            namespace,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/{}", self.addr, path.trim_start_matches('/'));
        let mut req = self.client.request(method, url);
        if !self.token.is_empty() {
            req = req.header("X-Vault-Token", &self.token);
        }
        if let Some(ns) = &self.namespace {
            req = req.header("X-Vault-Namespace", ns);
        }
        req
    }

    /// `POST /v1/<path>` with a JSON body.
    pub async fn write(&self, path: &str, body: &Value) -> Result<Value, KmsError> {
        debug!(path, "vault write");
        let resp = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| KmsError::Transport(e.to_string()))?;
        Self::decode(path, resp).await
    }

    /// `GET /v1/<path>`.
    pub async fn read(&self, path: &str) -> Result<Value, KmsError> {
        debug!(path, "vault read");
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| KmsError::Transport(e.to_string()))?;
        Self::decode(path, resp).await
    }

    /// Read one string field of a KV v2 secret (`data.data.<field>`).
    pub async fn kv_field(&self, path: &str, field: &str) -> Result<String, KmsError> {
        let secret = self.read(path).await?;
        let data = secret["data"]["data"]
            .as_object()
            .ok_or_else(|| KmsError::MalformedResponse(format!("secret {path} has no data")))?;
        data.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                KmsError::MalformedResponse(format!("secret {path} has no string field '{field}'"))
            })
    }

    async fn decode(path: &str, resp: reqwest::Response) -> Result<Value, KmsError> {
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if status >= 400 {
            return Err(KmsError::Remote {
                path: path.to_string(),
                status,
                message: extract_vault_error(&body),
            });
        }
        Ok(body)
    }
}

/// Join Vault's `{"errors": [...]}` array into one line.
fn extract_vault_error(body: &Value) -> String {
    match body["errors"].as_array() {
        Some(errors) if !errors.is_empty() => errors
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        _ => "no error details".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn kv_field_reads_nested_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/tfbackend"))
            .and(header("X-Vault-Token", "root"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "key": "c2VjcmV0" }, "metadata": { "version": 3 } }
            })))
            .mount(&server)
            .await;

        let vault = VaultClient::with_token(&server.uri(), "root", None);
        let key = vault.kv_field("secret/data/tfbackend", "key").await.unwrap();
        assert_eq!(key, "c2VjcmV0");

        let missing = vault.kv_field("secret/data/tfbackend", "other").await;
        assert!(matches!(missing, Err(KmsError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn error_status_carries_vault_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/nope"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] })),
            )
            .mount(&server)
            .await;

        let vault = VaultClient::with_token(&server.uri(), "root", None);
        match vault.read("secret/data/nope").await {
            Err(KmsError::Remote { status, message, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "permission denied");
            }
            other => panic!("expected Remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn namespace_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .and(header("X-Vault-Namespace", "team-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let vault = VaultClient::with_token(&server.uri(), "t", Some("team-a".into()));
        vault.read("sys/health").await.unwrap();
    }

    #[tokio::test]
    async fn connect_prefers_static_token() {
        let mut config = VaultConfig::new("http://127.0.0.1:1");
        config.token = Some("static".into());
        config.kube_auth_role = Some("ignored".into());
        let vault = VaultClient::connect(&config).await.unwrap();
        assert_eq!(vault.token, "static");
    }

    #[tokio::test]
    async fn connect_logs_in_with_service_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/k8s/login"))
            .and(body_partial_json(json!({ "jwt": "sa-jwt", "role": "tfbackend" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": { "client_token": "s.issued" }
            })))
            .mount(&server)
            .await;

        let mut sa = tempfile::NamedTempFile::new().unwrap();
        writeln!(sa, "sa-jwt").unwrap();

        let mut config = VaultConfig::new(server.uri());
        config.kube_auth_role = Some("tfbackend".into());
        config.kube_auth_name = "k8s".into();
        config.service_account_token_path = sa.path().to_path_buf();

        let vault = VaultClient::connect(&config).await.unwrap();
        assert_eq!(vault.token, "s.issued");
    }

    #[tokio::test]
    async fn connect_without_login_method_fails() {
        let config = VaultConfig::new("http://127.0.0.1:1");
        assert!(matches!(VaultClient::connect(&config).await, Err(KmsError::Login(_))));

        let empty = VaultConfig::new("");
        assert!(matches!(VaultClient::connect(&empty).await, Err(KmsError::Login(_))));
    }
}
