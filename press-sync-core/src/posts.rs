//! Posts: lookup by slug across every publication status, and create-or-update by slug.

use std::fmt;

use futures::stream::{Stream, TryStreamExt};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::client::WordPressApi;
use crate::error::{Result, WpError};

pub const POSTS_ENDPOINT: &str = "wp/v2/posts";

/// The listing endpoint filters by a single status, so unpublished posts are only
/// found by asking for each status in turn.
pub const POST_STATUSES: [&str; 5] = ["publish", "future", "draft", "pending", "private"];

/// REST fields of one post. `slug` is the stable key; `id` exists once the remote has
/// stored the post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostRecord {
    fields: Map<String, Value>,
}

impl PostRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(WpError::Integrity(format!("expected a post object, got {other}"))),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn id(&self) -> Option<u64> {
        self.fields.get("id").and_then(Value::as_u64)
    }

    pub fn slug(&self) -> Option<&str> {
        self.fields.get("slug").and_then(Value::as_str)
    }

    /// Title as a plain string, whether stored raw or as the `{"rendered": …}` object the
    /// API returns.
    pub fn title(&self) -> Option<&str> {
        match self.fields.get("title")? {
            Value::String(s) => Some(s),
            Value::Object(obj) => obj
                .get("rendered")
                .or_else(|| obj.get("raw"))
                .and_then(Value::as_str),
            _ => None,
        }
    }

    /// Copy of this record with `updates` merged over its fields.
    pub fn with_fields<I>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut fields = self.fields.clone();
        fields.extend(updates);
        Self { fields }
    }
}

impl fmt::Display for PostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |key: &str| match self.fields.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "?".to_string(),
            Some(other) => other.to_string(),
        };
        let created = field("date");
        let modified = field("modified");
        let on = if created == modified {
            created
        } else {
            format!("{created} ({modified})")
        };
        write!(
            f,
            "<Post {:?} by {} on {}>",
            self.title().unwrap_or(""),
            field("author"),
            on
        )
    }
}

/// Outcome of [`PostsProxy::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

pub struct PostsProxy<'a> {
    api: &'a WordPressApi,
}

impl<'a> PostsProxy<'a> {
    pub fn new(api: &'a WordPressApi) -> Self {
        Self { api }
    }

    /// Every post visible to the session, lazily paged.
    pub fn list(&self) -> impl Stream<Item = Result<PostRecord>> + Send + 'a {
        self.api
            .paged(POSTS_ENDPOINT, self.api.page_size(), Vec::new())
            .and_then(|value| async move { PostRecord::from_value(value) })
    }

    /// Finds the post with `slug`, whatever its status.
    pub async fn get(&self, slug: &str) -> Result<Option<PostRecord>> {
        for status in POST_STATUSES {
            let query = vec![
                ("slug".to_string(), slug.to_string()),
                ("status".to_string(), status.to_string()),
            ];
            let mut posts = self.api.paged_all(POSTS_ENDPOINT, query).await?;
            match posts.len() {
                0 => continue,
                1 => {
                    debug!(slug, status, "Found post");
                    return PostRecord::from_value(posts.remove(0)).map(Some);
                }
                n => {
                    if self.api.debug() {
                        let ids: Vec<Option<u64>> =
                            posts.iter().map(|p| p.get("id").and_then(Value::as_u64)).collect();
                        warn!(slug, status, ?ids, "Duplicate posts share a slug");
                    }
                    error!(slug, status, count = n, "Slug is not unique on the remote");
                    return Err(WpError::Integrity(format!(
                        "{n} posts with status {status:?} share slug {slug:?}"
                    )));
                }
            }
        }
        Ok(None)
    }

    /// Like [`PostsProxy::get`], but a missing post is an error.
    pub async fn require(&self, slug: &str) -> Result<PostRecord> {
        match self.get(slug).await? {
            Some(post) => Ok(post),
            None => Err(WpError::not_found(
                format!("post on {}", self.api.host()),
                vec![slug.to_string()],
            )),
        }
    }

    /// Creates the post if no remote post has `slug`, otherwise updates it in place.
    ///
    /// The remote must echo the slug back unchanged; anything else is an integrity fault.
    pub async fn upsert(&self, slug: &str, record: &PostRecord) -> Result<(UpsertAction, PostRecord)> {
        let existing_id = match record.id() {
            Some(id) => Some(id),
            None => self.get(slug).await?.and_then(|p| p.id()),
        };

        let mut body = record.fields().clone();
        body.insert("slug".to_string(), Value::String(slug.to_string()));
        body.remove("id");
        let body = Value::Object(body);

        let (action, endpoint) = match existing_id {
            Some(id) => {
                info!(slug, id, "Updating existing post");
                (UpsertAction::Updated, format!("{POSTS_ENDPOINT}/{id}"))
            }
            None => {
                info!(slug, "Creating new post");
                (UpsertAction::Created, POSTS_ENDPOINT.to_string())
            }
        };

        let saved = PostRecord::from_value(self.api.post_json(&endpoint, &body).await?)?;
        if saved.slug() != Some(slug) {
            error!(requested = slug, returned = ?saved.slug(), "Remote altered the post slug");
            return Err(WpError::Integrity(format!(
                "requested slug {slug:?} but the remote stored {:?}",
                saved.slug()
            )));
        }
        Ok((action, saved))
    }

    /// Stores `record` under `slug`, overriding any slug it carried.
    pub async fn assign(&self, slug: &str, record: &PostRecord) -> Result<PostRecord> {
        let slugged = record.with_fields([("slug".to_string(), Value::String(slug.to_string()))]);
        self.upsert(slug, &slugged).await.map(|(_, saved)| saved)
    }
}
