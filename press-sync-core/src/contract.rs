//! # contract: the transport seam between the API proxies and HTTP
//!
//! Every remote call made by the proxies and the media sync engine goes through the
//! [`Transport`] trait. The production implementation is
//! [`crate::transport::HttpTransport`]; tests use the generated `MockTransport`.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockTransport` is exported when the
//!   `test-export-mocks` feature is on (the default), so integration tests in `tests/`
//!   and downstream crates can script exact call sequences.
//!
//! ## Error contract
//! - Any non-2xx response becomes [`WpError::Api`] carrying status and body.
//! - No method retries.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde_json::Value;

use crate::download::DownloadOptions;
use crate::error::Result;

/// Query string pairs, in request order.
pub type Query = Vec<(String, String)>;

/// Username plus application password, sent as HTTP Basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub app_password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            app_password: app_password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

/// Authenticated access to `<host>/wp-json/<endpoint>`.
///
/// `endpoint` is always relative to the REST root (`wp/v2/posts`, `""` for the
/// discovery document). [`Transport::download`] takes an absolute URL instead, since
/// media may be served from another host.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Base host URL, without the REST prefix.
    fn host(&self) -> String;

    fn has_credentials(&self) -> bool;

    /// Installs credentials for all subsequent requests.
    fn set_credentials(&self, credentials: Credentials);

    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<Value>;

    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value>;

    /// Uploads raw bytes as the request body.
    async fn post_binary(
        &self,
        endpoint: &str,
        bytes: Vec<u8>,
        content_type: &str,
        content_disposition: &str,
    ) -> Result<Value>;

    /// Streams `url` into `dest`, returning `None` for statuses the options allow.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<Option<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("admin", "abcd efgh ijkl");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("abcd"));
    }
}
