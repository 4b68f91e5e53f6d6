use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::hash::HashAlgorithm;

/// Stable application id sent with authorization requests, so repeated grants are
/// recognised as the same client by the site.
pub const DEFAULT_APP_UUID: &str = "80adaaed-dce3-48bc-aa36-a502483beac9";
pub const DEFAULT_APP_NAME: &str = "press-sync";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MAX_PAGES: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            host = %self.site.host,
            posts_dir = ?self.content.posts_dir,
            media_dir = ?self.content.media_dir,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

/// Where the site lives and how the client identifies itself. No secrets here:
/// credentials are injected separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub host: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_uuid")]
    pub app_uuid: String,
    /// Extra diagnostics for lookups (missing slugs, duplicate matches).
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Safety cap on paged listings.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
}

impl SiteConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            app_name: default_app_name(),
            app_uuid: default_app_uuid(),
            debug: false,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Directory of markdown posts to publish.
    pub posts_dir: Option<PathBuf>,
    /// Base directory for media files named by the remote.
    pub media_dir: Option<PathBuf>,
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_app_uuid() -> String {
    DEFAULT_APP_UUID.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}
