use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Invalid include pattern '{pattern}': {source}")]
    InvalidInclude {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid transform pattern '{pattern}': {source}")]
    InvalidTransform {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Malformed transform rule '{0}' (expected '<pattern> => <replacement>')")]
    MalformedTransform(String),

    #[error("Unknown column '{0}' (valid: container, status, detail, repository, image, domain, path, tag, update)")]
    UnknownColumn(String),

    #[error("Token exchange with {url} failed: {message}")]
    AuthExchange { url: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
