use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use redis::aio::ConnectionManager;
use redis::IntoConnectionInfo;
use tfbackend_domain::{LockInfo, StateId};
use tracing::info;

use crate::error::LockError;
use crate::locker::{decide_lock, LockOutcome, Locker, UnlockOutcome};
use crate::redlock::Redlock;

/// Lifetime of a state lock payload in Redis.
pub const LOCK_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// [`Locker`] keeping one key per state in Redis.
///
/// Every call runs inside the [`Redlock`] meta-mutex. The payload itself is
/// written with `SET NX`, so a second writer inside a broken critical
/// section still cannot overwrite a held lock.
pub struct RedisLocker {
    conn: ConnectionManager,
    mutex: Redlock,
}

/// Open a managed connection to one node.
///
/// `addr` is either `host:port` or a full `redis://` URL.
pub async fn connect_node(addr: &str, password: Option<&str>) -> Result<ConnectionManager, LockError> {
    let url = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    };
    let mut info = url.as_str().into_connection_info()?;
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        info.redis.password = Some(password.to_string());
    }
    let client = redis::Client::open(info)?;
    Ok(ConnectionManager::new(client).await?)
}

impl RedisLocker {
    /// Connect to every address. Payloads live on the first node; the
    /// meta-mutex needs a majority of all of them.
    pub async fn connect(addrs: &[String], password: Option<&str>, tries: u32) -> Result<Self, LockError> {
        if addrs.is_empty() {
            return Err(LockError::Config("no redis address configured".into()));
        }

        let mut nodes = Vec::with_capacity(addrs.len());
        for addr in addrs {
            nodes.push(connect_node(addr, password).await?);
        }
        info!(nodes = nodes.len(), tries, "connected redis locker");

        let conn = nodes[0].clone();
        Ok(Self::new(conn, Redlock::new(nodes).with_tries(tries)))
    }

    pub fn new(conn: ConnectionManager, mutex: Redlock) -> Self {
        Self { conn, mutex }
    }

    async fn read(&self, id: &StateId) -> Result<LockInfo, LockError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(id.as_str()).query_async(&mut conn).await?;
        let value = value.ok_or_else(|| LockError::NotFound(id.clone()))?;

        let raw = BASE64.decode(value.as_bytes()).map_err(|e| LockError::Corrupt {
            id: id.clone(),
            reason: format!("not base64: {e}"),
        })?;
        LockInfo::from_json(&raw).map_err(|e| LockError::Corrupt {
            id: id.clone(),
            reason: e.to_string(),
        })
    }

    async fn write(&self, id: &StateId, lock: &LockInfo) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let value = BASE64.encode(lock.to_json()?);
        let reply: Option<String> = redis::cmd("SET")
            .arg(id.as_str())
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(LOCK_TTL.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        match reply.as_deref() {
            Some("OK") => Ok(()),
            _ => Err(LockError::Backend(format!("could not set lock for state {id}"))),
        }
    }

    async fn remove(&self, id: &StateId) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("DEL").arg(id.as_str()).query_async(&mut conn).await?;
        if count != 1 {
            return Err(LockError::Backend(format!(
                "deleted {count} redis keys while unlocking state {id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Locker for RedisLocker {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn lock(&self, id: &StateId, proposed: &LockInfo) -> Result<LockOutcome, LockError> {
        self.mutex
            .with_mutex(|| async move {
                match self.read(id).await {
                    Ok(current) => Ok(decide_lock(current, proposed)),
                    Err(e) if e.is_not_found() => {
                        self.write(id, proposed).await?;
                        Ok(LockOutcome::Acquired)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn unlock(&self, id: &StateId, presented: &LockInfo) -> Result<UnlockOutcome, LockError> {
        self.mutex
            .with_mutex(|| async move {
                let current = match self.read(id).await {
                    Ok(current) => current,
                    Err(e) if e.is_not_found() => return Ok(UnlockOutcome::Absent),
                    Err(e) => return Err(e),
                };
                if current != *presented {
                    return Ok(UnlockOutcome::Mismatch(current));
                }
                self.remove(id).await?;
                Ok(UnlockOutcome::Released)
            })
            .await
    }

    async fn get_lock(&self, id: &StateId) -> Result<LockInfo, LockError> {
        self.mutex.with_mutex(|| self.read(id)).await
    }
}
