pub mod error;
pub mod force;
pub mod locker;
pub mod memory;
pub mod postgres;
pub mod redis_lock;
pub mod redlock;

#[cfg(test)]
mod conformance;

pub use error::LockError;
pub use force::ForceUnlock;
pub use locker::{LockOutcome, Locker, UnlockOutcome};
pub use memory::InMemoryLocker;
pub use postgres::PostgresLocker;
pub use redis_lock::RedisLocker;
pub use redlock::Redlock;
