//! Storage wrapper that fails on one path.

use super::{relative, DirEntry, FsMetadata, MemoryStorage, Storage, StorageCapabilities};
use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tandem_core::{NodeReader, NodeWriter};

/// Delegates to a [`MemoryStorage`], except that every call touching the
/// poisoned path (or anything below it) fails with `PermissionDenied`.
#[derive(Debug, Clone)]
pub(crate) struct FaultyStorage {
    inner: MemoryStorage,
    poisoned: PathBuf,
}

impl FaultyStorage {
    pub(crate) fn new(inner: MemoryStorage, poisoned: &str) -> Self {
        Self {
            inner,
            poisoned: relative(Path::new(poisoned)),
        }
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        if relative(path).starts_with(&self.poisoned) {
            return Err(io::Error::new(ErrorKind::PermissionDenied, "denied"));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    fn capabilities(&self) -> StorageCapabilities {
        self.inner.capabilities()
    }

    fn physical_root(&self) -> Option<&Path> {
        None
    }

    async fn stat(&self, path: &Path) -> io::Result<FsMetadata> {
        self.check(path)?;
        self.inner.stat(path).await
    }

    async fn open_read(&self, path: &Path) -> io::Result<NodeReader> {
        self.check(path)?;
        self.inner.open_read(path).await
    }

    async fn create(&self, path: &Path) -> io::Result<NodeWriter> {
        self.check(path)?;
        self.inner.create(path).await
    }

    async fn open_write(&self, path: &Path) -> io::Result<NodeWriter> {
        self.check(path)?;
        self.inner.open_write(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check(path)?;
        self.inner.create_dir_all(path).await
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        self.check(path)?;
        self.inner.remove_all(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(from)?;
        self.check(to)?;
        self.inner.rename(from, to).await
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.check(path)?;
        let mut entries = self.inner.read_dir(path).await?;
        for entry in &mut entries {
            if let Err(e) = self.check(&path.join(&entry.name)) {
                entry.metadata = Err(e);
            }
        }
        Ok(entries)
    }
}
