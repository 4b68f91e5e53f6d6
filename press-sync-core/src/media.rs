//! # media: media records, lookup, and the media sync engine
//!
//! A [`MediaRecord`] pairs a local file with the remote's metadata document for it.
//! [`MediaSync`] decides, per record, whether the two are in sync and moves bytes in
//! whichever direction is needed:
//!
//! 1. Equal content hashes mean nothing to do, whatever the timestamps say.
//! 2. Otherwise the side with the newer modification time wins: a newer local file is
//!    uploaded, anything else is downloaded over the local copy.
//!
//! This is last-writer-wins by clock with a hash-verified skip. It does not merge and
//! cannot tell concurrent edits on both sides apart from a plain update.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{Stream, TryStreamExt};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::WordPressApi;
use crate::download::DownloadOptions;
use crate::error::{Result, WpError};
use crate::hash::{content_hash, HashAlgorithm};
use crate::timestamp::{format_system_time, normalize_timestamp, parse_remote_timestamp, system_time_to_utc};

pub const MEDIA_ENDPOINT: &str = "wp/v2/media";

/// File types the remote accepts as raw uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Svg,
    Webp,
}

impl MediaType {
    const TABLE: [(&'static str, MediaType); 5] = [
        ("jpg", MediaType::Jpeg),
        ("jpeg", MediaType::Jpeg),
        ("png", MediaType::Png),
        ("svg", MediaType::Svg),
        ("webp", MediaType::Webp),
    ];

    pub fn from_path(path: &Path) -> Result<Self> {
        let suffix = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Self::TABLE
            .iter()
            .find(|(ext, _)| *ext == suffix)
            .map(|(_, t)| *t)
            .ok_or(WpError::UnsupportedMediaType(suffix))
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Svg => "image/svg+xml",
            MediaType::Webp => "image/webp",
        }
    }
}

/// How to address a media item on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKey {
    BySlug(String),
    ById(u64),
}

impl From<&str> for MediaKey {
    fn from(slug: &str) -> Self {
        MediaKey::BySlug(slug.to_string())
    }
}

impl From<u64> for MediaKey {
    fn from(id: u64) -> Self {
        MediaKey::ById(id)
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKey::BySlug(slug) => write!(f, "slug {slug}"),
            MediaKey::ById(id) => write!(f, "id {id}"),
        }
    }
}

/// A local path plus the remote metadata document for the same media item.
///
/// Records are values: the `with_*` methods return a new record.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    path: PathBuf,
    metadata: Map<String, Value>,
}

impl MediaRecord {
    /// Resolves the local path: a missing path becomes `./<remote file name>`, a
    /// directory becomes `<dir>/<remote file name>`.
    pub fn new(path: Option<PathBuf>, metadata: Map<String, Value>) -> Self {
        let path = match path {
            Some(p) if !p.is_dir() => p,
            dir => {
                let name = remote_file_name(&metadata).unwrap_or_default();
                match dir {
                    Some(dir) => dir.join(name),
                    None => Path::new(".").join(name),
                }
            }
        };
        Self { path, metadata }
    }

    pub fn from_value(path: Option<PathBuf>, value: Value) -> Result<Self> {
        match value {
            Value::Object(metadata) => Ok(Self::new(path, metadata)),
            other => Err(WpError::Integrity(format!("expected a media object, got {other}"))),
        }
    }

    /// Record for an existing local file. `date` defaults to the file's modification
    /// time and `modified` to `date`; both are normalised to the remote format.
    pub fn from_file(path: impl Into<PathBuf>, metadata: Map<String, Value>) -> Result<Self> {
        let path = path.into();
        let mut metadata = metadata;
        let date = match metadata.get("date") {
            Some(value) => normalize_timestamp(value)?,
            None => format_system_time(fs::metadata(&path)?.modified()?),
        };
        let modified = match metadata.get("modified") {
            Some(value) => normalize_timestamp(value)?,
            None => date.clone(),
        };
        metadata.insert("date".to_string(), Value::String(date));
        metadata.insert("modified".to_string(), Value::String(modified));
        Ok(Self { path, metadata })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn id(&self) -> Option<u64> {
        self.metadata.get("id").and_then(Value::as_u64)
    }

    pub fn slug(&self) -> Option<&str> {
        self.metadata.get("slug").and_then(Value::as_str)
    }

    pub fn source_url(&self) -> Option<&str> {
        self.metadata.get("source_url").and_then(Value::as_str)
    }

    /// Remote modification time; `modified_gmt` wins over `modified` when both exist.
    pub fn remote_modified(&self) -> Result<Option<NaiveDateTime>> {
        let raw = self
            .metadata
            .get("modified_gmt")
            .or_else(|| self.metadata.get("modified"))
            .and_then(Value::as_str);
        raw.map(parse_remote_timestamp).transpose()
    }

    /// File name of the local path, falling back to the remote's name for it.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .or_else(|| remote_file_name(&self.metadata))
            .unwrap_or_default()
    }

    /// Name sent on upload: `slug` plus the local suffix when a slug is known, so the
    /// remote file name follows the slug across renames.
    pub fn upload_file_name(&self) -> String {
        match self.slug() {
            Some(slug) => match self.path.extension() {
                Some(ext) => format!("{slug}.{}", ext.to_string_lossy()),
                None => slug.to_string(),
            },
            None => self.file_name(),
        }
    }

    pub fn with_metadata<I>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut metadata = self.metadata.clone();
        metadata.extend(updates);
        Self {
            path: self.path.clone(),
            metadata,
        }
    }

    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: self.metadata.clone(),
        }
    }
}

fn remote_file_name(metadata: &Map<String, Value>) -> Option<String> {
    let from_details = metadata
        .get("media_details")
        .and_then(|d| d.get("file"))
        .and_then(Value::as_str);
    let from_url = metadata.get("source_url").and_then(Value::as_str);
    from_details
        .or(from_url)
        .and_then(|s| s.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Where a record stands, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    LocalOnly,
    RemoteOnly,
    InSync,
    LocalNewer,
    RemoteNewer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Skipped,
    Uploaded(MediaRecord),
    Downloaded(Option<PathBuf>),
}

pub struct MediaSync<'a> {
    api: &'a WordPressApi,
    algorithm: HashAlgorithm,
    download_options: DownloadOptions,
}

impl<'a> MediaSync<'a> {
    pub fn new(api: &'a WordPressApi) -> Self {
        Self {
            api,
            algorithm: api.hash_algorithm(),
            download_options: DownloadOptions::default(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_download_options(mut self, options: DownloadOptions) -> Self {
        self.download_options = options;
        self
    }

    pub fn local_hash(&self, record: &MediaRecord) -> Result<String> {
        content_hash(record.path(), self.algorithm)
    }

    /// Digest of the remote bytes. The API publishes no checksum, so this downloads
    /// the file to a scratch directory first.
    pub async fn remote_hash(&self, record: &MediaRecord) -> Result<String> {
        let url = source_url(record)?;
        let scratch = tempfile::tempdir()?;
        let dest = scratch.path().join(scratch_name(record));
        match self
            .api
            .transport()
            .download(url, &dest, &self.download_options)
            .await?
        {
            Some(path) => content_hash(&path, self.algorithm),
            None => Err(WpError::not_found("remote media", vec![url.to_string()])),
        }
    }

    /// Byte equality of the two sides. Timestamps play no part.
    pub async fn in_sync(&self, record: &MediaRecord) -> Result<bool> {
        let local = self.local_hash(record)?;
        let remote = self.remote_hash(record).await?;
        debug!(path = %record.path().display(), %local, %remote, "Compared content hashes");
        Ok(local == remote)
    }

    pub async fn state(&self, record: &MediaRecord) -> Result<SyncState> {
        if !record.path().is_file() {
            return Ok(SyncState::RemoteOnly);
        }
        if record.source_url().is_none() {
            return Ok(SyncState::LocalOnly);
        }
        if self.in_sync(record).await? {
            return Ok(SyncState::InSync);
        }
        if self.local_is_newer(record)? {
            Ok(SyncState::LocalNewer)
        } else {
            Ok(SyncState::RemoteNewer)
        }
    }

    fn local_is_newer(&self, record: &MediaRecord) -> Result<bool> {
        let local: DateTime<Utc> = system_time_to_utc(fs::metadata(record.path())?.modified()?);
        let remote = record.remote_modified()?.ok_or_else(|| {
            WpError::Format(format!(
                "media record for {} has no modified timestamp",
                record.path().display()
            ))
        })?;
        Ok(local > remote.and_utc())
    }

    /// Brings local and remote into agreement, uploading or downloading as needed.
    ///
    /// With `check_sync` off the hash comparison is skipped and the timestamps alone
    /// pick the direction.
    pub async fn sync(&self, record: &MediaRecord, check_sync: bool) -> Result<SyncOutcome> {
        let local_exists = record.path().is_file();
        if local_exists && record.source_url().is_none() {
            info!(path = %record.path().display(), "No remote copy yet, uploading");
            return self.upload(record).await.map(SyncOutcome::Uploaded);
        }
        if local_exists && check_sync && self.in_sync(record).await? {
            info!(path = %record.path().display(), "Already in sync");
            return Ok(SyncOutcome::Skipped);
        }
        if local_exists && self.local_is_newer(record)? {
            info!(path = %record.path().display(), "Local copy is newer, uploading");
            self.upload(record).await.map(SyncOutcome::Uploaded)
        } else {
            info!(path = %record.path().display(), "Remote copy is newer, downloading");
            self.download(record, None, true, &self.download_options)
                .await
                .map(SyncOutcome::Downloaded)
        }
    }

    /// Sends the local file to the remote, updating the existing item when one is
    /// known by id or slug. Returns the record merged with the remote's response.
    pub async fn upload(&self, record: &MediaRecord) -> Result<MediaRecord> {
        let path = record.path();
        if !path.is_file() {
            error!(path = %path.display(), "Cannot upload missing local file");
            return Err(WpError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no local file at {}", path.display()),
            )));
        }
        let media_type = MediaType::from_path(path)?;

        let existing_id = match (record.id(), record.slug()) {
            (Some(id), _) => Some(id),
            (None, Some(slug)) => {
                let found = self
                    .api
                    .media(None)
                    .get(&MediaKey::BySlug(slug.to_string()))
                    .await?
                    .and_then(|m| m.id());
                if found.is_none() && self.api.debug() {
                    debug!(slug, "No existing media with this slug");
                }
                found
            }
            (None, None) => None,
        };

        let endpoint = match existing_id {
            Some(id) => {
                if self.api.debug() {
                    debug!(id, "Updating existing media");
                }
                format!("{MEDIA_ENDPOINT}/{id}")
            }
            None => MEDIA_ENDPOINT.to_string(),
        };

        let bytes = fs::read(path)?;
        let disposition = format!("attachment; filename={}", record.upload_file_name());
        info!(
            path = %path.display(),
            endpoint = %endpoint,
            mime = media_type.mime(),
            bytes = bytes.len(),
            "Uploading media"
        );
        let response = self
            .api
            .transport()
            .post_binary(&endpoint, bytes, media_type.mime(), &disposition)
            .await?;
        match response {
            Value::Object(fields) => Ok(record.with_metadata(fields)),
            other => Err(WpError::Integrity(format!(
                "expected a media object after upload, got {other}"
            ))),
        }
    }

    /// Fetches the remote file to `to_path` (or the record's own path).
    ///
    /// A directory target gets the record's file name appended. An existing file is
    /// only overwritten with `replace_existing`. Statuses allowed by `options` yield
    /// `None` instead of an error.
    pub async fn download(
        &self,
        record: &MediaRecord,
        to_path: Option<&Path>,
        replace_existing: bool,
        options: &DownloadOptions,
    ) -> Result<Option<PathBuf>> {
        let url = source_url(record)?;
        let mut target = to_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| record.path().to_path_buf());
        if target.is_dir() {
            target = target.join(record.file_name());
        }
        if target.exists() && !replace_existing {
            warn!(path = %target.display(), "Refusing to overwrite existing file");
            return Err(WpError::FileExists(target));
        }
        info!(url, path = %target.display(), "Downloading media");
        self.api
            .transport()
            .download(url, &target, options)
            .await
    }
}

fn source_url(record: &MediaRecord) -> Result<&str> {
    record.source_url().ok_or_else(|| {
        WpError::Integrity(format!(
            "media record for {} has no source_url",
            record.path().display()
        ))
    })
}

fn scratch_name(record: &MediaRecord) -> String {
    let name = record.file_name();
    if name.is_empty() {
        "remote".to_string()
    } else {
        name
    }
}

pub struct MediaProxy<'a> {
    api: &'a WordPressApi,
    local_dir: Option<PathBuf>,
}

impl<'a> MediaProxy<'a> {
    pub fn new(api: &'a WordPressApi, local_dir: Option<PathBuf>) -> Self {
        Self { api, local_dir }
    }

    /// Every media item, paired with a path under the proxy's local directory.
    pub fn list(&self) -> impl Stream<Item = Result<MediaRecord>> + Send + 'a {
        let local_dir = self.local_dir.clone();
        self.api
            .paged(MEDIA_ENDPOINT, self.api.page_size(), Vec::new())
            .and_then(move |value| {
                let local_dir = local_dir.clone();
                async move { MediaRecord::from_value(local_dir, value) }
            })
    }

    pub async fn get(&self, key: &MediaKey) -> Result<Option<MediaRecord>> {
        let value = match key {
            MediaKey::BySlug(slug) => {
                // A unique literal keeps intermediaries from answering with a stale listing.
                let query = vec![
                    ("slug".to_string(), slug.clone()),
                    ("nocache".to_string(), Uuid::new_v4().to_string()),
                ];
                let mut found = self.api.paged_all(MEDIA_ENDPOINT, query).await?;
                match found.len() {
                    0 => return Ok(None),
                    1 => found.remove(0),
                    n => {
                        if self.api.debug() {
                            let ids: Vec<Option<u64>> =
                                found.iter().map(|m| m.get("id").and_then(Value::as_u64)).collect();
                            warn!(slug = %slug, ?ids, "Duplicate media share a slug");
                        }
                        error!(slug = %slug, count = n, "Media slug is not unique on the remote");
                        return Err(WpError::Integrity(format!(
                            "{n} media items share slug {slug:?}"
                        )));
                    }
                }
            }
            MediaKey::ById(id) => {
                match self.api.get(&format!("{MEDIA_ENDPOINT}/{id}"), &[]).await {
                    Ok(value) => value,
                    Err(WpError::Api { status: 404, .. }) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
        };
        MediaRecord::from_value(self.local_dir.clone(), value).map(Some)
    }

    pub async fn require(&self, key: &MediaKey) -> Result<MediaRecord> {
        match self.get(key).await? {
            Some(record) => Ok(record),
            None => Err(WpError::not_found(
                format!("media on {}", self.api.host()),
                vec![key.to_string()],
            )),
        }
    }

    /// Uploads `record` under `slug`.
    pub async fn assign(&self, slug: &str, record: &MediaRecord) -> Result<MediaRecord> {
        let slugged = record.with_metadata([("slug".to_string(), Value::String(slug.to_string()))]);
        self.api.media_sync().upload(&slugged).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn meta(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn mime_table_is_case_insensitive() {
        assert_eq!(MediaType::from_path(Path::new("a.JPG")).unwrap().mime(), "image/jpeg");
        assert_eq!(MediaType::from_path(Path::new("a.jpeg")).unwrap().mime(), "image/jpeg");
        assert_eq!(MediaType::from_path(Path::new("a.png")).unwrap().mime(), "image/png");
        assert_eq!(MediaType::from_path(Path::new("a.svg")).unwrap().mime(), "image/svg+xml");
        assert_eq!(MediaType::from_path(Path::new("a.webp")).unwrap().mime(), "image/webp");
    }

    #[test]
    fn unknown_suffix_is_named() {
        match MediaType::from_path(Path::new("clip.gif")) {
            Err(WpError::UnsupportedMediaType(s)) => assert_eq!(s, "gif"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            MediaType::from_path(Path::new("README")),
            Err(WpError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn path_derived_from_remote_file_name() {
        let m = meta(json!({"media_details": {"file": "2021/05/cat.png"}}));
        let record = MediaRecord::new(None, m.clone());
        assert_eq!(record.path(), Path::new("./cat.png"));

        let dir = tempdir().unwrap();
        let record = MediaRecord::new(Some(dir.path().to_path_buf()), m);
        assert_eq!(record.path(), dir.path().join("cat.png"));
    }

    #[test]
    fn path_falls_back_to_source_url() {
        let m = meta(json!({"source_url": "https://cdn.example.com/up/dog.jpg"}));
        assert_eq!(MediaRecord::new(None, m).path(), Path::new("./dog.jpg"));
    }

    #[test]
    fn explicit_file_path_is_kept() {
        let m = meta(json!({"media_details": {"file": "2021/05/cat.png"}}));
        let record = MediaRecord::new(Some(PathBuf::from("/nonexistent/kitten.png")), m);
        assert_eq!(record.path(), Path::new("/nonexistent/kitten.png"));
    }

    #[test]
    fn upload_name_prefers_slug() {
        let record = MediaRecord::new(
            Some(PathBuf::from("/x/IMG_0001.PNG")),
            meta(json!({"slug": "sunset"})),
        );
        assert_eq!(record.upload_file_name(), "sunset.PNG");
        let unslugged = MediaRecord::new(Some(PathBuf::from("/x/IMG_0001.PNG")), Map::new());
        assert_eq!(unslugged.upload_file_name(), "IMG_0001.PNG");
    }

    #[test]
    fn with_metadata_leaves_original_untouched() {
        let record = MediaRecord::new(Some(PathBuf::from("/x/a.png")), meta(json!({"slug": "a"})));
        let updated = record.with_metadata([("slug".to_string(), json!("b"))]);
        assert_eq!(record.slug(), Some("a"));
        assert_eq!(updated.slug(), Some("b"));
        assert_eq!(updated.path(), record.path());
    }

    #[test]
    fn remote_modified_prefers_gmt() {
        let record = MediaRecord::new(
            Some(PathBuf::from("/x/a.png")),
            meta(json!({"modified": "2021-01-01T10:00:00", "modified_gmt": "2021-01-01T08:00:00"})),
        );
        assert_eq!(
            record.remote_modified().unwrap().unwrap().to_string(),
            "2021-01-01 08:00:00"
        );
    }

    #[test]
    fn from_file_defaults_dates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"png").unwrap();
        let record = MediaRecord::from_file(&path, Map::new()).unwrap();
        let date = record.metadata()["date"].as_str().unwrap().to_string();
        assert!(parse_remote_timestamp(&date).is_ok());
        assert_eq!(record.metadata()["modified"], json!(date));

        let record = MediaRecord::from_file(&path, meta(json!({"date": "2020-01-02"}))).unwrap();
        assert_eq!(record.metadata()["date"], json!("2020-01-02T00:00:00"));
        assert_eq!(record.metadata()["modified"], json!("2020-01-02T00:00:00"));
    }

    #[test]
    fn media_key_conversions() {
        assert_eq!(MediaKey::from("logo"), MediaKey::BySlug("logo".into()));
        assert_eq!(MediaKey::from(7u64), MediaKey::ById(7));
        assert_eq!(MediaKey::ById(7).to_string(), "id 7");
    }
}
