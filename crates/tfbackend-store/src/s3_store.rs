use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::{events::Event as XmlEvent, Reader as XmlReader};
use reqwest::Method;
use sha2::{Digest, Sha256};
use tfbackend_domain::StateId;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::StateStore;

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "s3";
const CONTENT_TYPE: &str = "application/octet-stream";

/// Connection settings for an S3 compatible object store.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// `host[:port]`, without scheme.
    pub endpoint: String,
    pub use_ssl: bool,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// One `<id>.tfstate` object per state, path-style addressing, SigV4 signed.
pub struct S3Store {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
}

impl S3Store {
    /// Build the client and verify the bucket exists.
    pub async fn connect(config: S3Config) -> Result<Self, StoreError> {
        let store = Self::new(config);
        store.check_bucket().await?;
        info!(endpoint = %store.base_url, bucket = %store.bucket, "connected s3 storage");
        Ok(store)
    }

    fn new(config: S3Config) -> Self {
        let scheme = if config.use_ssl { "https" } else { "http" };
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{scheme}://{}", config.endpoint.trim_end_matches('/')),
            bucket: config.bucket,
            region: config.region,
            access_key: config.access_key,
            secret_key: config.secret_key,
        }
    }

    fn object_path(&self, id: &StateId) -> String {
        format!("/{}/{}.tfstate", self.bucket, id)
    }

    async fn check_bucket(&self) -> Result<(), StoreError> {
        let path = format!("/{}", self.bucket);
        let resp = self.send(Method::HEAD, &path, Vec::new()).await?;
        match resp.status().as_u16() {
            200..=299 => Ok(()),
            404 => Err(StoreError::Config(format!("bucket {} does not exist", self.bucket))),
            status => Err(StoreError::Internal(format!(
                "checking bucket {} failed with status {status}",
                self.bucket
            ))),
        }
    }

    async fn send(&self, method: Method, path: &str, body: Vec<u8>) -> Result<reqwest::Response, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        let host = url_host(&url).to_string();
        let headers = sigv4_headers(
            method.as_str(),
            path,
            "",
            CONTENT_TYPE,
            &body,
            &self.access_key,
            &self.secret_key,
            &self.region,
            &host,
            Utc::now(),
        )?;

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("Content-Type", CONTENT_TYPE);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }

        debug!(%method, path, "s3 request");
        req.body(body)
            .send()
            .await
            .map_err(|e| StoreError::Internal(format!("s3 {method} {path}: {e}")))
    }

    async fn failure(op: &str, resp: reqwest::Response) -> StoreError {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        StoreError::Internal(format!(
            "s3 {op} failed with status {status} ({}): {}",
            xml_error_code(&text),
            xml_error_message(&text)
        ))
    }
}

#[async_trait]
impl StateStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn save_state(&self, id: &StateId, data: &[u8]) -> Result<(), StoreError> {
        let resp = self.send(Method::PUT, &self.object_path(id), data.to_vec()).await?;
        if !resp.status().is_success() {
            return Err(Self::failure("PutObject", resp).await);
        }
        Ok(())
    }

    async fn get_state(&self, id: &StateId) -> Result<Vec<u8>, StoreError> {
        let resp = self.send(Method::GET, &self.object_path(id), Vec::new()).await?;
        let status = resp.status();
        if status.is_success() {
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| StoreError::Internal(format!("s3 GetObject body: {e}")))?;
            return Ok(bytes.to_vec());
        }

        let text = resp.text().await.unwrap_or_default();
        if status.as_u16() == 404 || xml_error_code(&text) == "NoSuchKey" {
            return Err(StoreError::NotFound(id.clone()));
        }
        Err(StoreError::Internal(format!(
            "s3 GetObject failed with status {} ({}): {}",
            status.as_u16(),
            xml_error_code(&text),
            xml_error_message(&text)
        )))
    }

    async fn delete_state(&self, id: &StateId) -> Result<(), StoreError> {
        let resp = self.send(Method::DELETE, &self.object_path(id), Vec::new()).await?;
        // S3 answers 204 for missing keys too; some compatible stores send 404.
        if resp.status().is_success() || resp.status().as_u16() == 404 {
            return Ok(());
        }
        Err(Self::failure("DeleteObject", resp).await)
    }
}

// ── SigV4 signing ─────────────────────────────────────────────────────────────

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::Internal(format!("hmac key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, StoreError> {
    let k_date    = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region  = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Extract the authority from a URL (scheme://host:port/path → host:port).
fn url_host(url: &str) -> &str {
    let without_scheme = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    match without_scheme.find('/') {
        Some(pos) => &without_scheme[..pos],
        None      => without_scheme,
    }
}

/// SigV4 headers for one S3 request signed at `now`.
///
/// The caller still sets `Content-Type`; `Host` comes from the URL.
#[allow(clippy::too_many_arguments)]
fn sigv4_headers(
    method:       &str,
    uri_path:     &str,
    query_string: &str,
    content_type: &str,
    body:         &[u8],
    access_key:   &str,
    secret_key:   &str,
    region:       &str,
    host:         &str,
    now:          DateTime<Utc>,
) -> Result<BTreeMap<String, String>, StoreError> {
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date      = now.format("%Y%m%d").to_string();

    let payload_hash = sha256_hex(body);

    // Canonical headers (sorted, lowercased)
    let mut canon_hdrs: BTreeMap<String, String> = BTreeMap::new();
    canon_hdrs.insert("content-type".into(), content_type.into());
    canon_hdrs.insert("host".into(), host.into());
    canon_hdrs.insert("x-amz-content-sha256".into(), payload_hash.clone());
    canon_hdrs.insert("x-amz-date".into(), timestamp.clone());

    let signed_headers: String = canon_hdrs.keys().cloned().collect::<Vec<_>>().join(";");
    let canonical_headers: String = canon_hdrs
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, uri_path, query_string,
        canonical_headers, signed_headers, payload_hash
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        timestamp, scope, sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(secret_key, &date, region, SERVICE)?;
    let signature   = hmac_sha256(&signing_key, string_to_sign.as_bytes())?
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();

    let auth = format!(
        "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
        access_key, scope, signed_headers, signature
    );

    let mut out = BTreeMap::new();
    out.insert("Authorization".into(), auth);
    out.insert("x-amz-date".into(), timestamp);
    out.insert("x-amz-content-sha256".into(), payload_hash);
    Ok(out)
}

// ── XML helpers ───────────────────────────────────────────────────────────────

/// Text content of the first `<tag>…</tag>` element, if any.
fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let tag_bytes  = tag.as_bytes();
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_tag = false;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) if e.local_name().as_ref() == tag_bytes => in_tag = true,
            Ok(XmlEvent::End(_)) if in_tag => return None,
            Ok(XmlEvent::Text(e)) if in_tag => {
                return e.unescape().ok().map(|s| s.into_owned());
            }
            Ok(XmlEvent::Eof) | Err(_) => break,
            _ => {}
        }
    }
    None
}

fn xml_error_code(xml: &str) -> String {
    xml_text(xml, "Code").unwrap_or_else(|| "Unknown".into())
}

fn xml_error_message(xml: &str) -> String {
    xml_text(xml, "Message").unwrap_or_else(|| "unknown error".into())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use wiremock::matchers::{body_bytes, header_exists, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NO_SUCH_KEY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>"#;

    fn test_config(server: &MockServer) -> S3Config {
        S3Config {
            endpoint: server.address().to_string(),
            use_ssl: false,
            bucket: "terraform-state".into(),
            region: "us-east-1".into(),
            access_key: "AKIDEXAMPLE".into(),
            secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
        }
    }

    async fn bucket_exists(server: &MockServer) {
        Mock::given(method("HEAD"))
            .and(path("/terraform-state"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[test]
    fn signing_key_matches_aws_example() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        let hex: String = key.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(hex, "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d");
    }

    #[test]
    fn authorization_header_names_scope_and_signed_headers() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let headers = sigv4_headers(
            "GET", "/terraform-state/abc.tfstate", "", CONTENT_TYPE, b"",
            "AKIDEXAMPLE", "secret", "eu-central-1", "minio:9000", now,
        )
        .unwrap();

        let auth = &headers["Authorization"];
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240501/eu-central-1/s3/aws4_request,"
        ));
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date,"));
        assert_eq!(headers["x-amz-date"], "20240501T100000Z");
        assert_eq!(
            headers["x-amz-content-sha256"],
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn url_host_keeps_port() {
        assert_eq!(url_host("http://127.0.0.1:9000/bucket/key"), "127.0.0.1:9000");
        assert_eq!(url_host("https://s3.amazonaws.com"), "s3.amazonaws.com");
    }

    #[test]
    fn xml_error_code_parses_s3_error() {
        assert_eq!(xml_error_code(NO_SUCH_KEY), "NoSuchKey");
        assert_eq!(xml_error_message(NO_SUCH_KEY), "The specified key does not exist.");
        assert_eq!(xml_error_code(""), "Unknown");
    }

    #[tokio::test]
    async fn connect_fails_for_missing_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/terraform-state"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = S3Store::connect(test_config(&server)).await.err();
        assert!(matches!(err, Some(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn save_puts_signed_object() {
        let server = MockServer::start().await;
        bucket_exists(&server).await;
        let id = StateId::derive("project1", "example");

        Mock::given(method("PUT"))
            .and(path(format!("/terraform-state/{id}.tfstate")))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .and(body_bytes(b"ciphertext".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = S3Store::connect(test_config(&server)).await.unwrap();
        store.save_state(&id, b"ciphertext").await.unwrap();
    }

    #[tokio::test]
    async fn get_returns_object_body() {
        let server = MockServer::start().await;
        bucket_exists(&server).await;
        let id = StateId::derive("p", "n");

        Mock::given(method("GET"))
            .and(path(format!("/terraform-state/{id}.tfstate")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"stored".to_vec()))
            .mount(&server)
            .await;

        let store = S3Store::connect(test_config(&server)).await.unwrap();
        assert_eq!(store.get_state(&id).await.unwrap(), b"stored");
    }

    #[tokio::test]
    async fn no_such_key_is_not_found() {
        let server = MockServer::start().await;
        bucket_exists(&server).await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/terraform-state/[0-9a-f]{64}\.tfstate$"))
            .respond_with(ResponseTemplate::new(404).set_body_string(NO_SUCH_KEY))
            .mount(&server)
            .await;

        let store = S3Store::connect(test_config(&server)).await.unwrap();
        let err = store.get_state(&StateId::derive("p", "missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn access_denied_is_not_mistaken_for_missing() {
        let server = MockServer::start().await;
        bucket_exists(&server).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
            ))
            .mount(&server)
            .await;

        let store = S3Store::connect(test_config(&server)).await.unwrap();
        let err = store.get_state(&StateId::derive("p", "n")).await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_object() {
        let server = MockServer::start().await;
        bucket_exists(&server).await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = S3Store::connect(test_config(&server)).await.unwrap();
        store.delete_state(&StateId::derive("p", "n")).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires TEST_S3_ENDPOINT (e.g. a local minio)"]
    async fn satisfies_store_contract() {
        let endpoint = std::env::var("TEST_S3_ENDPOINT").unwrap();
        let store = S3Store::connect(S3Config {
            endpoint,
            use_ssl: false,
            bucket: std::env::var("TEST_S3_BUCKET").unwrap_or_else(|_| "tf-backend-integration-test".into()),
            region: "us-east-1".into(),
            access_key: std::env::var("TEST_S3_ACCESS_KEY").unwrap_or_else(|_| "root".into()),
            secret_key: std::env::var("TEST_S3_SECRET_KEY").unwrap_or_else(|_| "password".into()),
        })
        .await
        .unwrap();
        conformance::run(&store).await;
    }
}
