//! Categories and tags: listing and name-to-id resolution.
//!
//! Both collections share one shape, so a single proxy is parameterised by
//! [`TaxonomyKind`]. Listings are cached on the API session; terms created through
//! [`TaxonomyProxy::resolve_ids`] are added to that cache so later resolutions in the
//! same session see them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::client::WordPressApi;
use crate::error::{Result, WpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyKind {
    Categories,
    Tags,
}

impl TaxonomyKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            TaxonomyKind::Categories => "wp/v2/categories",
            TaxonomyKind::Tags => "wp/v2/tags",
        }
    }
}

impl fmt::Display for TaxonomyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxonomyKind::Categories => write!(f, "categories"),
            TaxonomyKind::Tags => write!(f, "tags"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyTerm {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

impl TaxonomyTerm {
    fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

pub struct TaxonomyProxy<'a> {
    api: &'a WordPressApi,
    kind: TaxonomyKind,
}

impl<'a> TaxonomyProxy<'a> {
    pub fn new(api: &'a WordPressApi, kind: TaxonomyKind) -> Self {
        Self { api, kind }
    }

    pub fn kind(&self) -> TaxonomyKind {
        self.kind
    }

    /// Drains the whole remote collection and refreshes the session cache.
    pub async fn list_all(&self) -> Result<BTreeMap<u64, TaxonomyTerm>> {
        let values = self.api.paged_all(self.kind.endpoint(), Vec::new()).await?;
        let mut terms = BTreeMap::new();
        for value in values {
            let term = TaxonomyTerm::from_value(value)?;
            terms.insert(term.id, term);
        }
        debug!(kind = %self.kind, count = terms.len(), "Listed taxonomy terms");
        self.api.store_terms(self.kind, terms.clone());
        Ok(terms)
    }

    async fn known_terms(&self) -> Result<BTreeMap<u64, TaxonomyTerm>> {
        match self.api.cached_terms(self.kind) {
            Some(terms) => Ok(terms),
            None => self.list_all().await,
        }
    }

    /// Maps human-readable names to ids, matching case-insensitively.
    ///
    /// Names differing only by case count as one. Remote names arrive HTML-escaped
    /// (`Rock &amp; Roll`) and are compared after decoding. Unmatched names are created when
    /// `create_if_missing` is set; otherwise the call fails with [`WpError::NotFound`]
    /// listing every missing name.
    pub async fn resolve_ids<I, S>(&self, names: I, create_if_missing: bool) -> Result<BTreeSet<u64>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // lowercase key -> first spelling seen
        let mut wanted: BTreeMap<String, String> = BTreeMap::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            wanted
                .entry(decode_entities(name).to_lowercase())
                .or_insert_with(|| name.to_string());
        }

        let mut ids = BTreeSet::new();
        if wanted.is_empty() {
            return Ok(ids);
        }

        for (id, term) in self.known_terms().await? {
            if wanted.remove(&decode_entities(&term.name).to_lowercase()).is_some() {
                ids.insert(id);
            }
        }

        if wanted.is_empty() {
            return Ok(ids);
        }

        if !create_if_missing {
            let missing: Vec<String> = wanted.into_values().collect();
            error!(kind = %self.kind, ?missing, "Taxonomy terms not found");
            return Err(WpError::not_found(self.kind.to_string(), missing));
        }

        for name in wanted.into_values() {
            let term = self.create(&name).await?;
            ids.insert(term.id);
        }
        Ok(ids)
    }

    /// Creates one term remotely and records it in the session cache.
    pub async fn create(&self, name: &str) -> Result<TaxonomyTerm> {
        let created = self
            .api
            .post_json(self.kind.endpoint(), &json!({ "name": name }))
            .await?;
        let term = TaxonomyTerm::from_value(created)?;
        info!(kind = %self.kind, id = term.id, name = %term.name, "Created taxonomy term");
        self.api.remember_term(self.kind, term.clone());
        Ok(term)
    }
}

/// Decodes the character references WordPress applies to term names.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest.find(';').and_then(|end| {
            let ch = match &rest[1..end] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                entity => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::decode_entities;

    #[test]
    fn decodes_named_and_numeric_references() {
        assert_eq!(decode_entities("Rock &amp; Roll"), "Rock & Roll");
        assert_eq!(decode_entities("Editor&#8217;s &#x27;picks&#039;"), "Editor\u{2019}s 'picks'");
        assert_eq!(decode_entities("&lt;b&gt; &quot;x&quot;"), "<b> \"x\"");
    }

    #[test]
    fn leaves_plain_and_unknown_text_alone() {
        assert_eq!(decode_entities("Travel"), "Travel");
        assert_eq!(decode_entities("Q&A"), "Q&A");
        assert_eq!(decode_entities("&bogus; & more"), "&bogus; & more");
    }
}
