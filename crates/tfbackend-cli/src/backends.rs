use std::sync::Arc;

use anyhow::{Context, Result};
use tfbackend_auth::{AuthRegistry, BasicAuth, GithubPatAuth, JwtAuth};
use tfbackend_config::{
    AuthConfig, Config, KmsConfig, LockConfig, StorageConfig, VaultSettings,
};
use tfbackend_kms::{Kms, LocalKms, VaultClient, VaultConfig, VaultTransit};
use tfbackend_lock::{ForceUnlock, InMemoryLocker, Locker, PostgresLocker, RedisLocker};
use tfbackend_store::{
    FileSystemStore, InMemoryStore, PostgresStore, S3Config, S3Store, StateStore,
};
use tracing::{info, warn};

/// KV v2 field holding the local encryption key.
const VAULT_KEY_FIELD: &str = "key";

pub async fn build_locker(config: &Config) -> Result<Arc<dyn Locker>> {
    let locker: Arc<dyn Locker> = match &config.lock {
        LockConfig::Local => Arc::new(InMemoryLocker::new()),
        LockConfig::Postgres { table } => Arc::new(
            PostgresLocker::connect(&config.postgres_connection, table)
                .await
                .context("failed to initialize postgres lock backend")?,
        ),
        LockConfig::Redis(redis) => Arc::new(
            RedisLocker::connect(&redis.addrs, redis.password.as_deref(), redis.mutex_tries)
                .await
                .context("failed to initialize redis lock backend")?,
        ),
    };
    info!(backend = locker.name(), force_unlock = config.force_unlock_enabled, "initialized lock backend");

    if config.force_unlock_enabled {
        Ok(Arc::new(ForceUnlock::new(locker)))
    } else {
        Ok(locker)
    }
}

pub async fn build_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match &config.storage {
        StorageConfig::Memory => {
            warn!("in-memory storage loses every state on restart");
            Arc::new(InMemoryStore::new())
        }
        StorageConfig::Fs { dir } => Arc::new(
            FileSystemStore::new(dir)
                .await
                .with_context(|| format!("failed to open state directory {}", dir.display()))?,
        ),
        StorageConfig::Postgres { table } => Arc::new(
            PostgresStore::connect(&config.postgres_connection, table)
                .await
                .context("failed to initialize postgres storage backend")?,
        ),
        StorageConfig::S3(s3) => Arc::new(
            S3Store::connect(S3Config {
                endpoint: s3.endpoint.clone(),
                use_ssl: s3.use_ssl,
                bucket: s3.bucket.clone(),
                region: s3.region.clone(),
                access_key: s3.access_key.clone(),
                secret_key: s3.secret_key.clone(),
            })
            .await
            .context("failed to initialize s3 storage backend")?,
        ),
    };
    info!(backend = store.name(), "initialized storage backend");
    Ok(store)
}

pub async fn build_kms(config: &Config) -> Result<Option<Arc<dyn Kms>>> {
    let kms: Arc<dyn Kms> = match &config.kms {
        KmsConfig::None => {
            warn!("KMS_BACKEND=none, states are stored unencrypted");
            return Ok(None);
        }
        KmsConfig::Local { key } => {
            Arc::new(LocalKms::new(key).context("KMS_KEY is not a valid key")?)
        }
        KmsConfig::Vault { key_path } => {
            let vault = vault_client(config.vault.as_ref()).await?;
            let key = vault
                .kv_field(key_path, VAULT_KEY_FIELD)
                .await
                .with_context(|| format!("failed to read encryption key from vault at {key_path}"))?;
            Arc::new(LocalKms::new(&key).context("key stored in vault is not a valid key")?)
        }
        KmsConfig::Transit { engine, key } => {
            let vault = vault_client(config.vault.as_ref()).await?;
            Arc::new(VaultTransit::new(vault, engine.as_str(), key.as_str()))
        }
    };
    info!(backend = kms.name(), "initialized KMS backend");
    Ok(Some(kms))
}

async fn vault_client(settings: Option<&VaultSettings>) -> Result<VaultClient> {
    let settings = settings.context("VAULT_ADDR is required for vault backed encryption")?;
    let mut config = VaultConfig::new(settings.addr.as_str());
    config.token = settings.token.clone();
    config.namespace = settings.namespace.clone();
    config.kube_auth_role = settings.kube_auth_role.clone();
    config.kube_auth_name = settings.kube_auth_name.clone();
    VaultClient::connect(&config)
        .await
        .with_context(|| format!("failed to log in to vault at {}", settings.addr))
}

/// OIDC issuer for the jwt authenticator: explicit, else Vault's identity engine.
pub fn jwt_issuer(auth: &AuthConfig, vault: Option<&VaultSettings>) -> Option<String> {
    auth.jwt_issuer
        .clone()
        .or_else(|| vault.map(|v| JwtAuth::vault_issuer(&v.addr)))
}

pub fn build_auth(config: &Config) -> AuthRegistry {
    let mut registry = AuthRegistry::new();
    if config.auth.basic_enabled {
        registry.register(Arc::new(BasicAuth::new()));
    }
    if let Some(issuer) = jwt_issuer(&config.auth, config.vault.as_ref()) {
        registry.register(Arc::new(JwtAuth::new(issuer)));
    }
    if let Some(org) = &config.auth.github_org {
        registry.register(Arc::new(GithubPatAuth::new(org.as_str())));
    }

    let enabled = registry.enabled();
    if enabled.is_empty() {
        warn!("no auth backend enabled, every state request will be rejected");
    } else {
        info!(backends = ?enabled, "initialized auth backends");
    }
    registry
}
