use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::LockError;

/// Key of the cross-process mutex guarding every lock operation.
pub const META_MUTEX_KEY: &str = "terraform-backend-state-lock";
/// Expiry of the meta-mutex. Only bounds an abandoned critical section.
pub const META_MUTEX_EXPIRY: Duration = Duration::from_secs(12 * 60 * 60);

const DRIFT_FACTOR: f64 = 0.01;
const RETRY_DELAY_MIN_MS: u64 = 50;
const RETRY_DELAY_MAX_MS: u64 = 250;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Majority of `nodes`.
pub fn quorum(nodes: usize) -> usize {
    nodes / 2 + 1
}

/// Time left on a mutex acquired `elapsed` after the first SET was sent.
fn validity(expiry: Duration, elapsed: Duration) -> Option<Duration> {
    let drift = Duration::from_secs_f64(expiry.as_secs_f64() * DRIFT_FACTOR) + Duration::from_millis(2);
    expiry.checked_sub(elapsed)?.checked_sub(drift).filter(|d| !d.is_zero())
}

/// Quorum mutex over independent Redis nodes (Redlock).
///
/// Acquisition sets `key` to a random token with `NX PX` on every node and
/// succeeds when a majority accepted within the validity window. Release
/// deletes the key only where it still carries our token.
#[derive(Clone)]
pub struct Redlock {
    nodes: Vec<ConnectionManager>,
    key: String,
    expiry: Duration,
    tries: u32,
}

/// Proof of a held meta-mutex, consumed by [`Redlock::release`].
#[derive(Debug)]
pub struct MutexToken {
    value: String,
}

impl Redlock {
    pub fn new(nodes: Vec<ConnectionManager>) -> Self {
        Self {
            nodes,
            key: META_MUTEX_KEY.to_string(),
            expiry: META_MUTEX_EXPIRY,
            tries: 1,
        }
    }

    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries.max(1);
        self
    }

    pub async fn acquire(&self) -> Result<MutexToken, LockError> {
        let needed = quorum(self.nodes.len());

        for attempt in 1..=self.tries {
            let value = Uuid::new_v4().to_string();
            let start = Instant::now();

            let mut granted = 0;
            for node in &self.nodes {
                if self.set_on(node, &value).await {
                    granted += 1;
                }
            }

            if granted >= needed {
                if let Some(validity) = validity(self.expiry, start.elapsed()) {
                    debug!(
                        key = %self.key,
                        granted,
                        attempt,
                        validity_ms = validity.as_millis() as u64,
                        "meta-mutex acquired"
                    );
                    return Ok(MutexToken { value });
                }
            }

            // Drop partial acquisitions before the next attempt.
            self.release_on_all(&value).await;

            if attempt < self.tries {
                let delay = rand::thread_rng().gen_range(RETRY_DELAY_MIN_MS..=RETRY_DELAY_MAX_MS);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(LockError::MutexUnavailable {
            key: self.key.clone(),
            tries: self.tries,
        })
    }

    pub async fn release(&self, token: MutexToken) -> Result<(), LockError> {
        let released = self.release_on_all(&token.value).await;
        if released < quorum(self.nodes.len()) {
            return Err(LockError::Backend(format!(
                "meta-mutex {} released on {released} of {} nodes",
                self.key,
                self.nodes.len()
            )));
        }
        Ok(())
    }

    /// Run `op` while holding the meta-mutex.
    ///
    /// The mutex is released on every path. A release failure after a failed
    /// operation yields [`LockError::Joined`]; after a successful one it is
    /// only logged.
    pub async fn with_mutex<T, F, Fut>(&self, op: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LockError>>,
    {
        let token = self.acquire().await.map_err(|e| {
            warn!(error = %e, "failed to lock meta-mutex");
            e
        })?;

        let result = op().await;
        settle(result, self.release(token).await)
    }

    async fn set_on(&self, node: &ConnectionManager, value: &str) -> bool {
        let mut conn = node.clone();
        let reply: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(&self.key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(self.expiry.as_millis() as u64)
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(reply) => reply.is_some(),
            Err(e) => {
                debug!(error = %e, "meta-mutex SET failed on one node");
                false
            }
        }
    }

    async fn release_on_all(&self, value: &str) -> usize {
        let script = redis::Script::new(RELEASE_SCRIPT);
        let mut released = 0;
        for node in &self.nodes {
            let mut conn = node.clone();
            let deleted: Result<i64, redis::RedisError> =
                script.key(&self.key).arg(value).invoke_async(&mut conn).await;
            match deleted {
                Ok(n) if n > 0 => released += 1,
                Ok(_) => {}
                Err(e) => debug!(error = %e, "meta-mutex release failed on one node"),
            }
        }
        released
    }
}

/// Combine the guarded operation's result with the meta-mutex release.
fn settle<T>(result: Result<T, LockError>, released: Result<(), LockError>) -> Result<T, LockError> {
    match (result, released) {
        (result, Ok(())) => result,
        (Ok(value), Err(release)) => {
            warn!(error = %release, "failed to unlock meta-mutex");
            Ok(value)
        }
        (Err(operation), Err(release)) => {
            warn!(error = %release, "failed to unlock meta-mutex");
            Err(LockError::Joined {
                operation: Box::new(operation),
                release: Box::new(release),
            })
        }
    }
}
