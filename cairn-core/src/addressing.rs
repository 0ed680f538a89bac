//! Content-addressable naming.
//!
//! Two key schemes with different trade-offs: stored media files are named
//! after their content hash so identical uploads collapse to one file, while
//! cache artifacts are keyed off the lowercased source path so lookups never
//! have to re-read the media. The ingestion pipeline renames files to their
//! canonical content-hash name before any cache artifact is computed, so a
//! path-derived key stays valid for the life of the file.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Hex digest of the file's content, computed in streaming fashion.
pub async fn hash_file_contents(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path.as_ref()).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Canonical storage name for a media file: `<content-hash><original-ext>`.
pub async fn canonical_file_name(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let digest = hash_file_contents(path).await?;
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => Ok(format!("{digest}.{ext}")),
        None => Ok(digest),
    }
}

/// Cache key for path-derived artifacts (thumbnails, transcodes).
///
/// Lowercased before hashing so the key survives case-only differences in
/// how callers spell the same path.
pub fn cache_key(path: impl AsRef<Path>) -> String {
    let normalized = path.as_ref().to_string_lossy().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}
