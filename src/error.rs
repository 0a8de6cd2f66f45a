use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a batch from being started or its output from being kept.
///
/// Failures of individual URLs are never reported through this type; they are
/// recorded on the [`CheckResult`](crate::http_probe::result::CheckResult)
/// instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to (de)serialise run record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write CSV results: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid DNS host `{host}`: {source}")]
    DnsHost {
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
