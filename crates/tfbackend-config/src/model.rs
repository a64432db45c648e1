use std::path::PathBuf;

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `host:port` to bind; a bare `:port` is widened to `0.0.0.0:port`.
    pub listen_addr: String,
    pub log_level: String,
    pub lock: LockConfig,
    /// Wrap the locker so an empty UNLOCK body releases whatever lock is held.
    pub force_unlock_enabled: bool,
    pub storage: StorageConfig,
    pub kms: KmsConfig,
    /// Present whenever `VAULT_ADDR` is set.
    pub vault: Option<VaultSettings>,
    pub postgres_connection: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockConfig {
    /// In-process map; only safe with a single server replica.
    Local,
    Postgres { table: String },
    Redis(RedisSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// One or more `host:port` (or `redis://`) nodes. Lock payloads live on
    /// the first node; the meta-mutex needs a quorum of all of them.
    pub addrs: Vec<String>,
    pub password: Option<String>,
    pub mutex_tries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Fs { dir: PathBuf },
    Postgres { table: String },
    S3(S3Settings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint: String,
    pub use_ssl: bool,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmsConfig {
    /// States are stored as plaintext.
    None,
    /// AES-256-GCM with a base64 key from config.
    Local { key: String },
    /// AES-256-GCM with the key read from field `key` of a Vault KV v2 secret.
    Vault { key_path: String },
    /// Vault's transit engine does the encryption.
    Transit { engine: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    pub addr: String,
    pub token: Option<String>,
    pub namespace: Option<String>,
    pub kube_auth_role: Option<String>,
    pub kube_auth_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub basic_enabled: bool,
    /// Explicit OIDC issuer. When unset and Vault is configured, the issuer
    /// of Vault's identity token engine is used instead.
    pub jwt_issuer: Option<String>,
    pub github_org: Option<String>,
}
