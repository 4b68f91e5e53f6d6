//! Content digests for change detection.
//!
//! The digests here decide whether a local and a remote file hold the same bytes.
//! They are not used for anything security related, so SHA-1 is the default.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, WpError};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha1 => write!(f, "sha1"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = WpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(WpError::Config(format!("unsupported hash algorithm {other:?}"))),
        }
    }
}

/// Hex digest of the file at `path`, read in fixed-size chunks.
pub fn content_hash(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let digest = match algorithm {
        HashAlgorithm::Sha1 => digest_file::<Sha1>(path)?,
        HashAlgorithm::Sha256 => digest_file::<Sha256>(path)?,
    };
    debug!(path = %path.display(), %algorithm, digest = %digest, "Computed content hash");
    Ok(digest)
}

fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn hash_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", b"hello world");
        let first = content_hash(&path, HashAlgorithm::Sha1).unwrap();
        let second = content_hash(&path, HashAlgorithm::Sha1).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn different_bytes_give_different_hashes() {
        let dir = tempdir().unwrap();
        let a = write_file(dir.path(), "a.bin", b"hello world");
        let b = write_file(dir.path(), "b.bin", b"hello world!");
        for algorithm in [HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
            assert_ne!(
                content_hash(&a, algorithm).unwrap(),
                content_hash(&b, algorithm).unwrap()
            );
        }
    }

    #[test]
    fn sha256_of_empty_file() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "empty", b"");
        assert_eq!(
            content_hash(&path, HashAlgorithm::Sha256).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn large_file_spanning_many_chunks() {
        let dir = tempdir().unwrap();
        let content = vec![7u8; CHUNK_SIZE * 3 + 17];
        let path = write_file(dir.path(), "big.bin", &content);
        let mut hasher = Sha1::new();
        hasher.update(&content);
        let expected: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(content_hash(&path, HashAlgorithm::Sha1).unwrap(), expected);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = content_hash(&dir.path().join("nope"), HashAlgorithm::Sha1).unwrap_err();
        assert!(matches!(err, WpError::Io(_)));
    }

    #[test]
    fn algorithm_parses_case_insensitively() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
