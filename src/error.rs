use std::path::PathBuf;

use thiserror::Error;

/// DNS 解析失败，不会写入缓存
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to resolve {host}: {reason}")]
pub struct ResolutionError {
    pub host: String,
    pub reason: String,
}

impl ResolutionError {
    pub fn new(host: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            host: host.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load paths from {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to write output {path:?}: {reason}")]
    Output { path: PathBuf, reason: String },

    #[error("failed to initialise logger: {0}")]
    Logger(String),

    #[error("worker aborted: {0}")]
    Worker(String),
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScanError::Request(format!("timed out: {}", e))
        } else {
            ScanError::Request(e.to_string())
        }
    }
}
