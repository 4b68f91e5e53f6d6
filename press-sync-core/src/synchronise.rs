//! Directory sync: publishes a folder of markdown files as posts.
//!
//! For every `*.md` file directly inside the directory (case-insensitive suffix,
//! processed in file-name order) this:
//!   - splits the YAML metadata block from the body ([`crate::frontmatter`]);
//!   - defaults `slug` to the file stem and `status` to `publish`;
//!   - normalises `date` (default: the file's mtime) and `modified` (default: `date`);
//!   - resolves `categories` and `tags` to ids, creating missing terms;
//!   - runs the `preprocess` pipeline and renders the body to HTML into `content`;
//!   - upserts the post by slug.
//!
//! The run is fail-fast: the first error aborts it and nothing after that file is
//! touched. Posts already upserted stay upserted.
//!
//! # Navigation
//! - Entry point: [`synchronise_directory`]
//! - Per-file conversion without the upload: [`build_post`]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::client::WordPressApi;
use crate::error::{Result, WpError};
use crate::frontmatter;
use crate::markdown::render_html;
use crate::posts::{PostRecord, UpsertAction};
use crate::preprocess::{apply_pipeline, parse_pipeline};
use crate::taxonomy::TaxonomyProxy;
use crate::timestamp::{format_system_time, normalize_timestamp};

pub const DEFAULT_STATUS: &str = "publish";

#[derive(Debug, Clone, PartialEq)]
pub struct SynchroniseReport {
    pub posts: Vec<PostReport>,
}

impl SynchroniseReport {
    pub fn created(&self) -> usize {
        self.count(UpsertAction::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(UpsertAction::Updated)
    }

    fn count(&self, action: UpsertAction) -> usize {
        self.posts.iter().filter(|p| p.action == action).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostReport {
    pub path: PathBuf,
    pub slug: String,
    pub id: Option<u64>,
    pub action: UpsertAction,
}

pub async fn synchronise_directory(dir: &Path, api: &WordPressApi) -> Result<SynchroniseReport> {
    info!(dir = %dir.display(), host = %api.host(), "Starting directory synchronisation");
    let files = markdown_files(dir)?;
    debug!(count = files.len(), "Found markdown files");

    let mut posts = Vec::with_capacity(files.len());
    for path in files {
        info!(path = %path.display(), "Synchronising post");
        let (slug, record) = match build_post(&path, api).await {
            Ok(built) => built,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to prepare post");
                return Err(e);
            }
        };
        let (action, saved) = match api.posts().upsert(&slug, &record).await {
            Ok(result) => result,
            Err(e) => {
                error!(path = %path.display(), slug = %slug, error = %e, "Failed to upsert post");
                return Err(e);
            }
        };
        info!(slug = %slug, id = ?saved.id(), ?action, "Post synchronised");
        posts.push(PostReport {
            path,
            slug,
            id: saved.id(),
            action,
        });
    }

    let report = SynchroniseReport { posts };
    info!(
        created = report.created(),
        updated = report.updated(),
        "Directory synchronisation finished"
    );
    Ok(report)
}

/// `*.md` files directly inside `dir`, sorted by file name.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_markdown = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("md"));
        if is_markdown && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Converts one markdown file into the slug and post payload to upsert.
///
/// Taxonomy names are resolved against `api` and missing terms are created, so this
/// can mutate the remote even though the post itself is not sent.
pub async fn build_post(path: &Path, api: &WordPressApi) -> Result<(String, PostRecord)> {
    let doc = frontmatter::read(path)?;
    let mut fields = doc.metadata;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let slug = match fields.get("slug") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => stem,
    };
    fields.insert("slug".to_string(), Value::String(slug.clone()));
    fields
        .entry("status")
        .or_insert_with(|| Value::String(DEFAULT_STATUS.to_string()));

    let date = match fields.get("date") {
        Some(value) => normalize_timestamp(value)?,
        None => format_system_time(fs::metadata(path)?.modified()?),
    };
    let modified = match fields.get("modified") {
        Some(value) => normalize_timestamp(value)?,
        None => date.clone(),
    };
    fields.insert("date".to_string(), Value::String(date));
    fields.insert("modified".to_string(), Value::String(modified));

    // Parsed before any remote call so a bad directive never creates terms.
    let pipeline = match fields.remove("preprocess") {
        Some(Value::String(directive)) => parse_pipeline(&directive)?,
        Some(Value::Array(names)) => {
            let directive = names
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",");
            parse_pipeline(&directive)?
        }
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(WpError::Frontmatter(format!(
                "preprocess must be a string or list, got {other}"
            )))
        }
    };

    resolve_terms(&mut fields, "categories", api.categories()).await?;
    resolve_terms(&mut fields, "tags", api.tags()).await?;

    let body = apply_pipeline(&pipeline, &doc.body);
    fields.insert("content".to_string(), Value::String(render_html(&body)));

    Ok((slug, PostRecord::new(fields)))
}

async fn resolve_terms(
    fields: &mut Map<String, Value>,
    key: &str,
    proxy: TaxonomyProxy<'_>,
) -> Result<()> {
    let names = match fields.get(key) {
        None | Some(Value::Null) => return Ok(()),
        Some(value) => term_names(key, value)?,
    };
    let ids = proxy.resolve_ids(&names, true).await?;
    debug!(key, ?names, ?ids, "Resolved taxonomy names");
    fields.insert(
        key.to_string(),
        Value::Array(ids.into_iter().map(Value::from).collect()),
    );
    Ok(())
}

/// Accepts `"a, b"` or a YAML list of names.
fn term_names(key: &str, value: &Value) -> Result<Vec<String>> {
    let names: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|n| n.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(WpError::Frontmatter(format!(
                    "{key} entries must be names, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(WpError::Frontmatter(format!(
                "{key} must be a string or list, got {other}"
            )))
        }
    };
    Ok(names.into_iter().filter(|n| !n.is_empty()).collect())
}
