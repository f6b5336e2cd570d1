//! Error type shared by every stage of the pipeline.
//!
//! Variants map onto how a failure is reported to the user: configuration
//! problems surface before any network call, authentication problems abort
//! before anything is written, and I/O problems abort the run wherever they
//! happen. Extraction misses are not errors and never reach this type.

use thiserror::Error;

/// Errors produced while fetching feeds and building output.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad credentials, missing `Auth=` token, or unreachable server.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Invalid flag combination or config file contents.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Network-level failure talking to the API.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API answered with a non-2xx status.
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
