//! Streaming file downloads.
//!
//! Bytes are written chunk by chunk into a scratch file next to the destination, owned
//! by a [`PartialFile`] guard. Only a committed guard replaces the destination, so a
//! failed download leaves neither a truncated artifact nor a damaged earlier copy.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WpError};

/// Bounds and tolerances for a single download.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Abort once the body grows past this many bytes.
    pub max_bytes: Option<u64>,
    /// Non-2xx statuses that mean "nothing to fetch" rather than failure.
    pub allowed_statuses: Vec<u16>,
}

impl DownloadOptions {
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn allow_status(mut self, status: u16) -> Self {
        self.allowed_statuses.push(status);
        self
    }

    pub fn allows(&self, status: u16) -> bool {
        self.allowed_statuses.contains(&status)
    }
}

/// Scratch file that becomes `dest` on [`PartialFile::commit`] and is discarded otherwise.
///
/// The scratch file lives in the destination's directory so the final rename never
/// crosses file systems.
#[derive(Debug)]
pub struct PartialFile {
    dest: PathBuf,
    file: Option<NamedTempFile>,
    written: u64,
}

impl PartialFile {
    pub fn create(dest: &Path) -> Result<Self> {
        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let file = tempfile::Builder::new()
            .prefix(".press-sync-")
            .suffix(".part")
            .tempfile_in(parent)?;
        Ok(Self {
            dest: dest.to_path_buf(),
            file: Some(file),
            written: 0,
        })
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(chunk)?;
                self.written += chunk.len() as u64;
                Ok(())
            }
            None => Err(WpError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "write after commit",
            ))),
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the scratch file and moves it over the destination.
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.as_file().sync_all()?;
            file.persist(&self.dest).map_err(|e| WpError::Io(e.error))?;
        }
        Ok(std::mem::take(&mut self.dest))
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            match file.close() {
                Ok(()) => warn!(dest = %self.dest.display(), "Discarded partial download"),
                Err(e) => error!(error = ?e, dest = %self.dest.display(), "Failed to remove partial download"),
            }
        }
    }
}

/// Streams the body of `response` into `dest`.
///
/// Returns `Ok(None)` when the response status is in `options.allowed_statuses`.
pub async fn stream_to_file(
    mut response: reqwest::Response,
    url: &str,
    dest: &Path,
    options: &DownloadOptions,
) -> Result<Option<PathBuf>> {
    let status = response.status();
    if !status.is_success() {
        if options.allows(status.as_u16()) {
            info!(url, status = status.as_u16(), "Download skipped on allowed status");
            return Ok(None);
        }
        let body = response.text().await.unwrap_or_default();
        error!(url, status = status.as_u16(), "Download failed");
        return Err(WpError::Api {
            status: status.as_u16(),
            body,
        });
    }

    if let (Some(max), Some(len)) = (options.max_bytes, response.content_length()) {
        if len > max {
            error!(url, content_length = len, max_bytes = max, "Download larger than allowed");
            return Err(WpError::DownloadTooLarge {
                url: url.to_string(),
                max_bytes: max,
            });
        }
    }

    let mut partial = PartialFile::create(dest)?;
    while let Some(chunk) = response.chunk().await? {
        partial.write_chunk(&chunk)?;
        if let Some(max) = options.max_bytes {
            if partial.written() > max {
                error!(url, written = partial.written(), max_bytes = max, "Download exceeded size bound");
                return Err(WpError::DownloadTooLarge {
                    url: url.to_string(),
                    max_bytes: max,
                });
            }
        }
    }
    let written = partial.written();
    let path = partial.commit()?;
    debug!(url, path = %path.display(), bytes = written, "Download complete");
    Ok(Some(path))
}
