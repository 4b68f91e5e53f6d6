//! # client: one API session against one site
//!
//! [`WordPressApi`] owns the [`Transport`] and everything cached for the lifetime of a
//! session:
//!   - the root discovery document, fetched on first use and kept until
//!     [`WordPressApi::reset_discovery`];
//!   - the category and tag listings used for name resolution.
//!
//! Resource proxies ([`PostsProxy`], [`MediaProxy`], [`TaxonomyProxy`]) borrow the session.
//! Nothing is persisted across processes.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::config::{SiteConfig, DEFAULT_APP_NAME, DEFAULT_APP_UUID, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::contract::{Credentials, Query, Transport};
use crate::error::{Result, WpError};
use crate::hash::HashAlgorithm;
use crate::media::{MediaProxy, MediaSync};
use crate::posts::PostsProxy;
use crate::taxonomy::{TaxonomyKind, TaxonomyProxy, TaxonomyTerm};
use crate::transport::HttpTransport;

pub struct WordPressApi {
    transport: Box<dyn Transport>,
    app_name: String,
    app_uuid: String,
    debug: bool,
    page_size: u32,
    max_pages: u32,
    hash_algorithm: HashAlgorithm,
    discovery: Mutex<Option<Arc<Value>>>,
    terms: Mutex<HashMap<TaxonomyKind, BTreeMap<u64, TaxonomyTerm>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl WordPressApi {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            app_name: DEFAULT_APP_NAME.to_string(),
            app_uuid: DEFAULT_APP_UUID.to_string(),
            debug: false,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            hash_algorithm: HashAlgorithm::default(),
            discovery: Mutex::new(None),
            terms: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a session over HTTPS from site configuration.
    pub fn from_config(site: &SiteConfig, credentials: Option<Credentials>) -> Result<Self> {
        if site.page_size == 0 {
            return Err(WpError::Config("page_size must be at least 1".into()));
        }
        let transport = HttpTransport::new(&site.host, credentials)?;
        let api = Self::new(transport)
            .with_app(&site.app_name, &site.app_uuid)
            .with_debug(site.debug)
            .with_paging(site.page_size, site.max_pages)
            .with_hash_algorithm(site.hash_algorithm);
        info!(
            host = %site.host,
            authenticated = api.is_authenticated(),
            "Created API session"
        );
        Ok(api)
    }

    pub fn with_app(mut self, name: &str, uuid: &str) -> Self {
        self.app_name = name.to_string();
        self.app_uuid = uuid.to_string();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_paging(mut self, page_size: u32, max_pages: u32) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages;
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn host(&self) -> String {
        self.transport.host()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn is_authenticated(&self) -> bool {
        self.transport.has_credentials()
    }

    /// Installs an application password obtained after construction.
    pub fn authenticate(&self, username: &str, app_password: &str) {
        info!(username, "Authenticating API session");
        self.transport
            .set_credentials(Credentials::new(username, app_password));
    }

    pub async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<Value> {
        self.transport.get(endpoint, query).await
    }

    pub async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.transport.post_json(endpoint, body).await
    }

    /// Lazily walks a collection endpoint page by page.
    ///
    /// Pages are requested in order until one holds fewer than `page_size` items, so a
    /// final full page costs one extra (empty) request. Fails with
    /// [`WpError::PagingLimit`] instead of looping forever if the remote keeps
    /// returning full pages.
    pub fn paged<'a>(
        &'a self,
        endpoint: &'a str,
        page_size: u32,
        query: Query,
    ) -> impl Stream<Item = Result<Value>> + Send + 'a {
        let page_size = page_size.max(1);
        let max_pages = self.max_pages;
        stream::try_unfold(Some(1u32), move |page| {
            let mut query = query.clone();
            async move {
                let page = match page {
                    Some(page) => page,
                    None => return Ok(None),
                };
                if page > max_pages {
                    error!(endpoint, max_pages, "Paging safety cap reached");
                    return Err(WpError::PagingLimit {
                        endpoint: endpoint.to_string(),
                        max_pages,
                    });
                }
                query.push(("page".to_string(), page.to_string()));
                query.push(("per_page".to_string(), page_size.to_string()));
                let items = match self.transport.get(endpoint, &query).await {
                    Ok(Value::Array(items)) => items,
                    Ok(other) => {
                        return Err(WpError::Integrity(format!(
                            "expected a JSON array from {endpoint}, got {other}"
                        )))
                    }
                    // Posts and media answer an out-of-range page with 400 instead of [].
                    Err(WpError::Api { status: 400, body })
                        if page > 1 && body.contains("invalid_page_number") =>
                    {
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                };
                debug!(endpoint, page, count = items.len(), "Fetched page");
                let next = if items.len() < page_size as usize {
                    None
                } else {
                    Some(page + 1)
                };
                Ok(Some((items, next)))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, WpError>)))
        .try_flatten()
    }

    /// Drains [`WordPressApi::paged`] into a vector.
    pub async fn paged_all(&self, endpoint: &str, query: Query) -> Result<Vec<Value>> {
        self.paged(endpoint, self.page_size, query).try_collect().await
    }

    /// The site's root discovery document, fetched once per session.
    pub async fn discovery(&self) -> Result<Arc<Value>> {
        let cached = lock(&self.discovery).clone();
        if let Some(doc) = cached {
            return Ok(doc);
        }
        debug!("Fetching root discovery document");
        let doc = Arc::new(self.transport.get("", &[]).await?);
        let mut slot = lock(&self.discovery);
        Ok(Arc::clone(slot.get_or_insert(doc)))
    }

    /// Drops the cached discovery document; the next access refetches it.
    pub fn reset_discovery(&self) {
        *lock(&self.discovery) = None;
    }

    /// URL where a user can grant this client an application password.
    pub async fn authorization_url(&self) -> Result<String> {
        let doc = self.discovery().await?;
        let endpoint = doc
            .get("authentication")
            .and_then(|a| a.get("application-passwords"))
            .ok_or_else(|| {
                error!("Remote does not advertise application passwords");
                WpError::Capability(
                    "application passwords are not available on this site".into(),
                )
            })?
            .pointer("/endpoints/authorization")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WpError::Capability("application-passwords entry has no authorization endpoint".into())
            })?;
        with_query(
            endpoint,
            &[
                ("app_name", self.app_name.as_str()),
                ("app_id", self.app_uuid.as_str()),
            ],
        )
    }

    pub fn posts(&self) -> PostsProxy<'_> {
        PostsProxy::new(self)
    }

    pub fn media(&self, local_dir: Option<PathBuf>) -> MediaProxy<'_> {
        MediaProxy::new(self, local_dir)
    }

    pub fn media_sync(&self) -> MediaSync<'_> {
        MediaSync::new(self)
    }

    pub fn categories(&self) -> TaxonomyProxy<'_> {
        TaxonomyProxy::new(self, TaxonomyKind::Categories)
    }

    pub fn tags(&self) -> TaxonomyProxy<'_> {
        TaxonomyProxy::new(self, TaxonomyKind::Tags)
    }

    pub(crate) fn cached_terms(&self, kind: TaxonomyKind) -> Option<BTreeMap<u64, TaxonomyTerm>> {
        lock(&self.terms).get(&kind).cloned()
    }

    pub(crate) fn store_terms(&self, kind: TaxonomyKind, terms: BTreeMap<u64, TaxonomyTerm>) {
        lock(&self.terms).insert(kind, terms);
    }

    pub(crate) fn remember_term(&self, kind: TaxonomyKind, term: TaxonomyTerm) {
        lock(&self.terms)
            .entry(kind)
            .or_default()
            .insert(term.id, term);
    }
}

/// Merges `params` into the query of `base`, replacing keys that already exist.
fn with_query(base: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(base)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_query_merges_and_replaces() {
        let url = with_query(
            "https://blog.example.com/wp-admin/authorize-application.php?app_name=old&x=1",
            &[("app_name", "press sync"), ("app_id", "abc")],
        )
        .unwrap();
        assert_eq!(
            url,
            "https://blog.example.com/wp-admin/authorize-application.php?x=1&app_name=press+sync&app_id=abc"
        );
    }

    #[test]
    fn with_query_rejects_relative_urls() {
        assert!(matches!(with_query("/relative", &[]), Err(WpError::Url(_))));
    }
}
