mod raw;
mod loader;
pub mod error;
pub mod model;

pub use error::ConfigError;
pub use loader::{load_config, load_from_process_env};
pub use model::*;
