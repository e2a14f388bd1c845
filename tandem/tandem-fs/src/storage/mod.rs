//! Storage backends an endpoint can be built on.
//!
//! Paths handed to a backend are native paths relative to the backend's root.
//! A leading separator is allowed and ignored; `.` and `..` segments are
//! dropped, so a backend never resolves anything outside its root.
//!
//! Everything speaks `std::io::Result` so callers can tell absence
//! (`ErrorKind::NotFound`) apart from real failures.

mod memory;
mod os;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStorage;
pub use os::OsStorage;

use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tandem_core::{NodeReader, NodeWriter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// What a backend can guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCapabilities {
    /// A single `rename` moves a whole subtree
    pub atomic_rename: bool,
    /// The OS notification source can observe this backend
    pub native_notifications: bool,
}

/// Result of a stat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub mode: u32,
}

/// One entry of a directory listing.
///
/// An entry that is listed but cannot be stat'ed (a dangling or looping
/// symlink, a permission failure) keeps its error so the caller can report
/// that path alone.
#[derive(Debug)]
pub struct DirEntry {
    pub name: String,
    pub metadata: io::Result<FsMetadata>,
}

impl DirEntry {
    /// Whether the entry is known to be a directory.
    pub fn is_dir(&self) -> bool {
        self.metadata.as_ref().is_ok_and(|md| md.is_dir)
    }
}

/// Virtualizable file storage.
#[async_trait]
pub trait Storage: Send + Sync + Debug {
    fn capabilities(&self) -> StorageCapabilities;

    /// Directory on the local disk backing this storage, if any
    fn physical_root(&self) -> Option<&Path>;

    async fn stat(&self, path: &Path) -> io::Result<FsMetadata>;

    async fn open_read(&self, path: &Path) -> io::Result<NodeReader>;

    /// Create a file, truncating it if it exists
    async fn create(&self, path: &Path) -> io::Result<NodeWriter>;

    /// Open an existing file for writing, truncating it
    async fn open_write(&self, path: &Path) -> io::Result<NodeWriter>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or a directory with everything below it
    async fn remove_all(&self, path: &Path) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Entries of a directory, sorted by name. Only a failure to list the
    /// directory itself is an `Err`.
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut reader = self.open_read(path).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut writer = self.create(path).await?;
        writer.write_all(contents).await?;
        writer.shutdown().await
    }
}

/// Keep only the normal segments of `path`, making it relative.
pub(crate) fn relative(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(segment) => Some(segment),
            _ => None,
        })
        .collect()
}
