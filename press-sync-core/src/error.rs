//! Error taxonomy shared by every module of the core crate.
//!
//! Remote failures carry the HTTP status and body so callers can diagnose them.
//! Nothing here is retried automatically.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WpError>;

#[derive(Debug, Error)]
pub enum WpError {
    /// Any non-2xx response from the remote.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// The remote does not advertise a feature we depend on.
    #[error("capability missing: {0}")]
    Capability(String),

    /// Named lookup failed and creating the missing entries was not allowed.
    #[error("{kind} not found: {}", missing.join(", "))]
    NotFound { kind: String, missing: Vec<String> },

    #[error("file already exists at {0:?}: pass replace_existing to overwrite")]
    FileExists(PathBuf),

    #[error("unsupported media type for suffix {0:?}")]
    UnsupportedMediaType(String),

    /// Timestamp did not match the remote format.
    #[error("invalid timestamp: {0}")]
    Format(String),

    /// Remote and local views diverged beyond what the sync model assumes.
    #[error("integrity fault: {0}")]
    Integrity(String),

    #[error("paging through {endpoint} exceeded {max_pages} pages")]
    PagingLimit { endpoint: String, max_pages: u32 },

    #[error("download of {url} exceeded {max_bytes} bytes")]
    DownloadTooLarge { url: String, max_bytes: u64 },

    #[error("unknown preprocessor: {0:?}")]
    UnknownPreprocessor(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed frontmatter: {0}")]
    Frontmatter(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl WpError {
    pub fn not_found(kind: impl Into<String>, missing: Vec<String>) -> Self {
        WpError::NotFound {
            kind: kind.into(),
            missing,
        }
    }

    /// Status code of an [`WpError::Api`] failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            WpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
