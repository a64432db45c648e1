pub mod error;
pub mod kms;
pub mod local;
pub mod transit;
pub mod vault;

pub use error::KmsError;
pub use kms::Kms;
pub use local::{generate_key, LocalKms};
pub use transit::VaultTransit;
pub use vault::{VaultClient, VaultConfig};
