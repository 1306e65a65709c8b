//! Error types for wafreplay

use thiserror::Error;

/// Result type alias using the wafreplay common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration and test definitions
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Bad encoded request: {0}")]
    BadEncodedRequest(String),
}
