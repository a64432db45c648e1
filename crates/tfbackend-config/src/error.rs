use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml parse error in {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value '{value}' for {key}: {message}")]
    Invalid {
        key: &'static str,
        value: String,
        message: String,
    },

    #[error("{key} must be set when {needed_by}")]
    Missing { key: &'static str, needed_by: String },

    #[error("KMS_KEY is not set; local encryption needs a 32-byte base64 key, for example: {generated}")]
    MissingKmsKey { generated: String },
}
