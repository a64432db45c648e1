use std::fmt;

use serde::Deserialize;

/// A YAML scalar as written in the config file. Everything is resolved
/// through its string form so file and environment values parse the same way.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawScalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for RawScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawScalar::Bool(b) => write!(f, "{b}"),
            RawScalar::Int(i) => write!(f, "{i}"),
            RawScalar::Str(s) => f.write_str(s),
        }
    }
}

/// Raw YAML representation of the server config file.
///
/// Keys are the lower-case environment variable names; environment values
/// override whatever is set here.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub listen_addr: Option<RawScalar>,
    pub log_level: Option<RawScalar>,

    pub lock_backend: Option<RawScalar>,
    pub lock_postgres_table: Option<RawScalar>,
    pub force_unlock_enabled: Option<RawScalar>,

    pub storage_backend: Option<RawScalar>,
    pub storage_fs_dir: Option<RawScalar>,
    pub storage_postgres_table: Option<RawScalar>,
    pub storage_s3_endpoint: Option<RawScalar>,
    pub storage_s3_use_ssl: Option<RawScalar>,
    pub storage_s3_bucket: Option<RawScalar>,
    pub storage_s3_region: Option<RawScalar>,
    pub storage_s3_access_key: Option<RawScalar>,
    pub storage_s3_secret_key: Option<RawScalar>,
    pub storage_s3_secret_key_file: Option<RawScalar>,

    pub kms_backend: Option<RawScalar>,
    pub kms_key: Option<RawScalar>,
    pub kms_key_file: Option<RawScalar>,
    pub kms_vault_key_path: Option<RawScalar>,
    pub kms_transit_engine: Option<RawScalar>,
    pub kms_transit_key: Option<RawScalar>,

    pub vault_addr: Option<RawScalar>,
    pub vault_token: Option<RawScalar>,
    pub vault_token_file: Option<RawScalar>,
    pub vault_namespace: Option<RawScalar>,
    pub vault_kube_auth_role: Option<RawScalar>,
    pub vault_kube_auth_name: Option<RawScalar>,

    pub postgres_connection: Option<RawScalar>,

    pub redis_addr: Option<RawScalar>,
    pub redis_password: Option<RawScalar>,
    pub redis_password_file: Option<RawScalar>,
    pub redis_mutex_tries: Option<RawScalar>,

    pub auth_basic_enabled: Option<RawScalar>,
    pub auth_jwt_oidc_issuer_url: Option<RawScalar>,
    pub auth_github_org: Option<RawScalar>,
}
