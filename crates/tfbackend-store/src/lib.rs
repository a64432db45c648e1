pub mod error;
pub mod fs_store;
pub mod memory;
pub mod postgres_store;
pub mod s3_store;
pub mod store;

#[cfg(test)]
mod conformance;

pub use error::StoreError;
pub use fs_store::FileSystemStore;
pub use memory::InMemoryStore;
pub use postgres_store::PostgresStore;
pub use s3_store::{S3Config, S3Store};
pub use store::StateStore;
