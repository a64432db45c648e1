use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tfbackend_domain::{is_sql_identifier, LockInfo, StateId};
use tracing::debug;

use crate::error::LockError;
use crate::locker::{decide_lock, LockOutcome, Locker, UnlockOutcome};

/// Upper bound for one lock transaction, including schema bootstrap.
pub const TX_TIMEOUT: Duration = Duration::from_secs(1);

/// [`Locker`] backed by one row per state in a Postgres table.
///
/// The primary key on `state_id` decides concurrent first locks: the loser's
/// INSERT fails with a unique violation and re-reads the winner.
#[derive(Clone)]
pub struct PostgresLocker {
    pool: PgPool,
    select_sql: String,
    insert_sql: String,
    delete_sql: String,
}

impl PostgresLocker {
    pub async fn connect(url: &str, table: &str) -> Result<Self, LockError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| LockError::Backend(format!("postgres connect: {e}")))?;
        Self::new(pool, table).await
    }

    /// Use an existing pool. Creates the table when missing.
    pub async fn new(pool: PgPool, table: &str) -> Result<Self, LockError> {
        if !is_sql_identifier(table) {
            return Err(LockError::Config(format!("invalid lock table name '{table}'")));
        }

        let locker = Self {
            pool,
            select_sql: format!("SELECT lock_data FROM {table} WHERE state_id = $1"),
            insert_sql: format!("INSERT INTO {table} (state_id, lock_data) VALUES ($1, $2)"),
            delete_sql: format!("DELETE FROM {table} WHERE state_id = $1 AND lock_data = $2"),
        };

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                state_id CHARACTER VARYING(255) PRIMARY KEY,
                lock_data BYTEA
            )"
        );
        bounded(async {
            let mut tx = locker.pool.begin().await?;
            sqlx::query(&ddl).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok::<_, LockError>(())
        })
        .await?;

        Ok(locker)
    }

    async fn try_lock(&self, id: &StateId, proposed: &LockInfo) -> Result<Attempt, LockError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Vec<u8>,)> = sqlx::query_as(&self.select_sql)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some((raw,)) = row {
            let (current, _) = decode(id, raw)?;
            return Ok(Attempt::Decided(decide_lock(current, proposed)));
        }

        let data = proposed.to_json()?;
        match sqlx::query(&self.insert_sql)
            .bind(id.as_str())
            .bind(&data)
            .execute(&mut *tx)
            .await
        {
            Ok(_) => {
                tx.commit().await?;
                Ok(Attempt::Decided(LockOutcome::Acquired))
            }
            Err(e) if is_unique_violation(&e) => {
                debug!(state_id = %id, "lost lock insert race");
                Ok(Attempt::LostRace)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, id: &StateId) -> Result<Option<(LockInfo, Vec<u8>)>, LockError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(&self.select_sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(raw,)| decode(id, raw)).transpose()
    }
}

enum Attempt {
    Decided(LockOutcome),
    LostRace,
}

fn decode(id: &StateId, raw: Vec<u8>) -> Result<(LockInfo, Vec<u8>), LockError> {
    let info = LockInfo::from_json(&raw).map_err(|e| LockError::Corrupt {
        id: id.clone(),
        reason: e.to_string(),
    })?;
    Ok((info, raw))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map_or(false, |d| d.is_unique_violation())
}

async fn bounded<T, F>(op: F) -> Result<T, LockError>
where
    F: Future<Output = Result<T, LockError>>,
{
    tokio::time::timeout(TX_TIMEOUT, op)
        .await
        .map_err(|_| LockError::Timeout(TX_TIMEOUT))?
}

#[async_trait]
impl Locker for PostgresLocker {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn lock(&self, id: &StateId, proposed: &LockInfo) -> Result<LockOutcome, LockError> {
        // A lost insert race re-reads the winner. If the winner already
        // released again, try once more from the top.
        for _ in 0..2 {
            match bounded(self.try_lock(id, proposed)).await? {
                Attempt::Decided(outcome) => return Ok(outcome),
                Attempt::LostRace => {
                    if let Some((current, _)) = bounded(self.read(id)).await? {
                        return Ok(decide_lock(current, proposed));
                    }
                }
            }
        }
        Err(LockError::Backend(format!("lock row for state {id} kept changing")))
    }

    async fn unlock(&self, id: &StateId, presented: &LockInfo) -> Result<UnlockOutcome, LockError> {
        bounded(async {
            let mut tx = self.pool.begin().await?;

            let row: Option<(Vec<u8>,)> = sqlx::query_as(&self.select_sql)
                .bind(id.as_str())
                .fetch_optional(&mut *tx)
                .await?;

            let Some((raw,)) = row else {
                return Ok(UnlockOutcome::Absent);
            };
            let (current, raw) = decode(id, raw)?;
            if current != *presented {
                return Ok(UnlockOutcome::Mismatch(current));
            }

            let deleted = sqlx::query(&self.delete_sql)
                .bind(id.as_str())
                .bind(&raw)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            if deleted.rows_affected() == 0 {
                debug!(state_id = %id, "lock row vanished before delete");
                return Ok(UnlockOutcome::Absent);
            }
            Ok::<_, LockError>(UnlockOutcome::Released)
        })
        .await
    }

    async fn get_lock(&self, id: &StateId) -> Result<LockInfo, LockError> {
        bounded(self.read(id))
            .await?
            .map(|(info, _)| info)
            .ok_or_else(|| LockError::NotFound(id.clone()))
    }
}
