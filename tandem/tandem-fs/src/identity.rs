//! Stable node identity.
//!
//! A leaf is identified by a digest of its content, recomputed on every load.
//! A collection is identified by a UUID stored in a hidden marker file inside
//! it, created the first time the collection is loaded.

use crate::storage::Storage;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the per-directory identity marker.
pub const MARKER_FILE: &str = ".__tandem";

const HASH_CHUNK: usize = 64 * 1024;

/// Hex BLAKE3 digest of the whole content of `path`, streamed.
pub async fn content_hash(storage: &dyn Storage, path: &Path) -> io::Result<String> {
    let mut reader = storage.open_read(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn marker_path(dir: &Path) -> PathBuf {
    dir.join(MARKER_FILE)
}

/// Read the marker of `dir`.
///
/// `None` when there is no marker or it is empty.
pub async fn read_marker(storage: &dyn Storage, dir: &Path) -> io::Result<Option<String>> {
    match storage.read_file(&marker_path(dir)).await {
        Ok(bytes) => {
            let id = String::from_utf8_lossy(&bytes).trim().to_string();
            Ok((!id.is_empty()).then_some(id))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn write_marker(storage: &dyn Storage, dir: &Path, id: &str) -> io::Result<()> {
    storage.write_file(&marker_path(dir), id.as_bytes()).await
}

/// Identifier of the collection at `dir`, minting and persisting one if needed.
///
/// Two callers racing on a fresh directory may both mint; the marker ends up
/// holding whichever was written last.
pub async fn folder_id(storage: &dyn Storage, dir: &Path) -> io::Result<String> {
    if let Some(id) = read_marker(storage, dir).await? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    debug!("Minting collection id {} for {}", id, dir.display());
    if let Err(e) = write_marker(storage, dir, &id).await {
        warn!("Failed to persist marker in {}: {}", dir.display(), e);
        return Err(e);
    }
    Ok(id)
}
