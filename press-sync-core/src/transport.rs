//! `reqwest`-backed [`Transport`].
//!
//! One long-lived [`reqwest::Client`] is shared by every request of a site session.
//! Credentials live behind a lock so they can be installed after an interactive
//! application-password grant.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::contract::{Credentials, Transport};
use crate::download::{stream_to_file, DownloadOptions};
use crate::error::{Result, WpError};

pub struct HttpTransport {
    host: String,
    client: Client,
    credentials: RwLock<Option<Credentials>>,
}

impl HttpTransport {
    pub fn new(host: &str, credentials: Option<Credentials>) -> Result<Self> {
        let host = normalize_host(host);
        let client = Client::builder()
            .user_agent(concat!("press-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        debug!(host = %host, authenticated = credentials.is_some(), "Initialised HTTP transport");
        Ok(Self {
            host,
            client,
            credentials: RwLock::new(credentials),
        })
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/wp-json/{}", self.host, endpoint.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let guard = match self.credentials.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(c) => request.basic_auth(&c.username, Some(&c.app_password)),
            None => request,
        }
    }

    async fn into_json(response: Response, url: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(url, status = status.as_u16(), body = %body, "Remote returned error status");
            return Err(WpError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

/// Prefixes bare hosts with `https://` and strips trailing slashes.
fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.starts_with("http://") {
        warn!(host = trimmed, "Host is not served over HTTPS; credentials travel in clear text");
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn host(&self) -> String {
        self.host.clone()
    }

    fn has_credentials(&self) -> bool {
        self.credentials
            .read()
            .map(|c| c.is_some())
            .unwrap_or(false)
    }

    fn set_credentials(&self, credentials: Credentials) {
        let mut guard = match self.credentials.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(username = %credentials.username, "Installed credentials");
        *guard = Some(credentials);
    }

    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, ?query, "GET");
        let response = self.authorize(self.client.get(&url).query(query)).send().await?;
        Self::into_json(response, &url).await
    }

    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, "POST json");
        let response = self.authorize(self.client.post(&url).json(body)).send().await?;
        Self::into_json(response, &url).await
    }

    async fn post_binary(
        &self,
        endpoint: &str,
        bytes: Vec<u8>,
        content_type: &str,
        content_disposition: &str,
    ) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, bytes = bytes.len(), content_type, content_disposition, "POST binary");
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_DISPOSITION, content_disposition)
            .body(bytes);
        let response = self.authorize(request).send().await?;
        Self::into_json(response, &url).await
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<Option<PathBuf>> {
        debug!(url, dest = %dest.display(), "Downloading");
        // Media URLs may point at a CDN; credentials stay with the REST host.
        let response = self.client.get(url).send().await?;
        stream_to_file(response, url, dest, options).await
    }
}
