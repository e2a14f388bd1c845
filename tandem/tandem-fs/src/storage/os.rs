use super::{relative, DirEntry, FsMetadata, Storage, StorageCapabilities};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tandem_core::{NodeReader, NodeWriter};
use tokio::fs;

/// Storage on the local disk, under a root directory.
#[derive(Debug, Clone)]
pub struct OsStorage {
    root: PathBuf,
}

impl OsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(relative(path))
    }
}

fn to_metadata(md: &std::fs::Metadata) -> FsMetadata {
    FsMetadata {
        is_dir: md.is_dir(),
        len: md.len(),
        modified: md.modified().ok(),
        mode: mode_of(md),
    }
}

#[cfg(unix)]
fn mode_of(md: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(md: &std::fs::Metadata) -> u32 {
    match (md.is_dir(), md.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[async_trait]
impl Storage for OsStorage {
    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities {
            atomic_rename: true,
            native_notifications: true,
        }
    }

    fn physical_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    async fn stat(&self, path: &Path) -> io::Result<FsMetadata> {
        let md = fs::metadata(self.resolve(path)).await?;
        Ok(to_metadata(&md))
    }

    async fn open_read(&self, path: &Path) -> io::Result<NodeReader> {
        let file = fs::File::open(self.resolve(path)).await?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &Path) -> io::Result<NodeWriter> {
        let file = fs::File::create(self.resolve(path)).await?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &Path) -> io::Result<NodeWriter> {
        let file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.resolve(path))
            .await?;
        Ok(Box::new(file))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path)).await
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let target = self.resolve(path);
        let md = fs::symlink_metadata(&target).await?;
        if md.is_dir() {
            fs::remove_dir_all(&target).await
        } else {
            fs::remove_file(&target).await
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.resolve(from), self.resolve(to)).await
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut rd = fs::read_dir(self.resolve(path)).await?;
        while let Some(entry) = rd.next_entry().await? {
            // Follow symlinks, as stat does
            let metadata = match fs::metadata(entry.path()).await {
                Ok(md) => Ok(to_metadata(&md)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Gone since listing, or a symlink to nothing
                    match fs::symlink_metadata(entry.path()).await {
                        Ok(_) => Err(e),
                        Err(_) => continue,
                    }
                }
                Err(e) => Err(e),
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
