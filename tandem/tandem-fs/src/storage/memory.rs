use super::{relative, DirEntry, FsMetadata, Storage, StorageCapabilities};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tandem_core::{NodeReader, NodeWriter};
use tokio::io::AsyncWrite;

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
enum MemNode {
    Dir { modified: SystemTime },
    File { data: Vec<u8>, modified: SystemTime },
}

impl MemNode {
    fn dir() -> Self {
        Self::Dir {
            modified: SystemTime::now(),
        }
    }

    fn file() -> Self {
        Self::File {
            data: Vec::new(),
            modified: SystemTime::now(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Self::Dir { .. })
    }

    fn metadata(&self) -> FsMetadata {
        match self {
            Self::Dir { modified } => FsMetadata {
                is_dir: true,
                len: 0,
                modified: Some(*modified),
                mode: DIR_MODE,
            },
            Self::File { data, modified } => FsMetadata {
                is_dir: false,
                len: data.len() as u64,
                modified: Some(*modified),
                mode: FILE_MODE,
            },
        }
    }
}

type Nodes = BTreeMap<PathBuf, MemNode>;

/// In-memory storage for tests.
///
/// Entries live in a flat map keyed by relative path, the empty path being
/// the root. A rename only moves the entry it names, so renaming a directory
/// that still has children fails and the capabilities report no atomic rename.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    nodes: Arc<Mutex<Nodes>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::new(), MemNode::dir());
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
        }
    }

    /// Number of entries, the root included.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

fn not_found(key: &Path) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("no such entry: /{}", key.display()))
}

fn require_dir(nodes: &Nodes, key: &Path) -> io::Result<()> {
    match nodes.get(key) {
        Some(node) if node.is_dir() => Ok(()),
        Some(_) => Err(io::Error::new(
            ErrorKind::NotADirectory,
            format!("not a directory: /{}", key.display()),
        )),
        None => Err(not_found(key)),
    }
}

fn require_parent(nodes: &Nodes, key: &Path) -> io::Result<()> {
    match key.parent() {
        Some(parent) => require_dir(nodes, parent),
        None => Err(io::Error::new(ErrorKind::InvalidInput, "root has no parent")),
    }
}

fn has_children(nodes: &Nodes, key: &Path) -> bool {
    nodes.keys().any(|k| k != key && k.starts_with(key))
}

/// Writer appending into a file entry.
struct MemWriter {
    nodes: Arc<Mutex<Nodes>>,
    key: PathBuf,
}

impl AsyncWrite for MemWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(&self.key) {
            Some(MemNode::File { data, modified }) => {
                data.extend_from_slice(buf);
                *modified = SystemTime::now();
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(not_found(&self.key))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl MemoryStorage {
    fn writer(&self, key: PathBuf) -> NodeWriter {
        Box::new(MemWriter {
            nodes: Arc::clone(&self.nodes),
            key,
        })
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities {
            atomic_rename: false,
            native_notifications: false,
        }
    }

    fn physical_root(&self) -> Option<&Path> {
        None
    }

    async fn stat(&self, path: &Path) -> io::Result<FsMetadata> {
        let key = relative(path);
        self.nodes
            .lock()
            .get(&key)
            .map(MemNode::metadata)
            .ok_or_else(|| not_found(&key))
    }

    async fn open_read(&self, path: &Path) -> io::Result<NodeReader> {
        let key = relative(path);
        let nodes = self.nodes.lock();
        match nodes.get(&key) {
            Some(MemNode::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(MemNode::Dir { .. }) => Err(io::Error::new(
                ErrorKind::IsADirectory,
                format!("is a directory: /{}", key.display()),
            )),
            None => Err(not_found(&key)),
        }
    }

    async fn create(&self, path: &Path) -> io::Result<NodeWriter> {
        let key = relative(path);
        {
            let mut nodes = self.nodes.lock();
            require_parent(&nodes, &key)?;
            if nodes.get(&key).is_some_and(MemNode::is_dir) {
                return Err(io::Error::new(
                    ErrorKind::IsADirectory,
                    format!("is a directory: /{}", key.display()),
                ));
            }
            nodes.insert(key.clone(), MemNode::file());
        }
        Ok(self.writer(key))
    }

    async fn open_write(&self, path: &Path) -> io::Result<NodeWriter> {
        let key = relative(path);
        {
            let mut nodes = self.nodes.lock();
            match nodes.get_mut(&key) {
                Some(MemNode::File { data, modified }) => {
                    data.clear();
                    *modified = SystemTime::now();
                }
                Some(MemNode::Dir { .. }) => {
                    return Err(io::Error::new(
                        ErrorKind::IsADirectory,
                        format!("is a directory: /{}", key.display()),
                    ));
                }
                None => return Err(not_found(&key)),
            }
        }
        Ok(self.writer(key))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let key = relative(path);
        let mut nodes = self.nodes.lock();
        let mut current = PathBuf::new();
        for segment in key.iter() {
            current.push(segment);
            match nodes.get(&current) {
                Some(node) if node.is_dir() => {}
                Some(_) => {
                    return Err(io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!("file exists: /{}", current.display()),
                    ));
                }
                None => {
                    nodes.insert(current.clone(), MemNode::dir());
                }
            }
        }
        Ok(())
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let key = relative(path);
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(&key) {
            return Err(not_found(&key));
        }
        nodes.retain(|k, _| !k.starts_with(&key));
        nodes.entry(PathBuf::new()).or_insert_with(MemNode::dir);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = relative(from);
        let to = relative(to);
        if from == to {
            return Ok(());
        }

        let mut nodes = self.nodes.lock();
        let node = nodes.get(&from).cloned().ok_or_else(|| not_found(&from))?;
        require_parent(&nodes, &to)?;
        if node.is_dir() && has_children(&nodes, &from) {
            return Err(io::Error::new(
                ErrorKind::DirectoryNotEmpty,
                format!("cannot rename non-empty directory /{}", from.display()),
            ));
        }
        match nodes.get(&to) {
            Some(existing) if existing.is_dir() && has_children(&nodes, &to) => {
                return Err(io::Error::new(
                    ErrorKind::DirectoryNotEmpty,
                    format!("destination not empty: /{}", to.display()),
                ));
            }
            Some(existing) if existing.is_dir() != node.is_dir() => {
                return Err(io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("destination has another type: /{}", to.display()),
                ));
            }
            _ => {}
        }

        nodes.remove(&from);
        nodes.insert(to, node);
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let key = relative(path);
        let nodes = self.nodes.lock();
        require_dir(&nodes, &key)?;

        let mut entries: Vec<DirEntry> = nodes
            .iter()
            .filter(|(k, _)| k.parent() == Some(key.as_path()))
            .filter_map(|(k, node)| {
                let name = k.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    metadata: Ok(node.metadata()),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_write_and_read_back() {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/docs")).await.unwrap();
        storage
            .write_file(Path::new("/docs/a.txt"), b"hello")
            .await
            .unwrap();

        assert_eq!(storage.read_file(Path::new("/docs/a.txt")).await.unwrap(), b"hello");
        let md = storage.stat(Path::new("/docs/a.txt")).await.unwrap();
        assert_eq!(md.len, 5);
        assert_eq!(md.mode, FILE_MODE);
        assert!(storage.stat(Path::new("/docs")).await.unwrap().is_dir);
    }

    #[tokio::test]
    async fn test_create_requires_parent() {
        let storage = MemoryStorage::new();
        let err = storage.create(Path::new("/missing/a.txt")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_open_write_truncates() {
        let storage = MemoryStorage::new();
        storage.write_file(Path::new("/a"), b"long content").await.unwrap();

        let mut writer = storage.open_write(Path::new("/a")).await.unwrap();
        writer.write_all(b"v2").await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(storage.read_file(Path::new("/a")).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_rename_of_populated_directory_fails() {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/a/b")).await.unwrap();

        let err = storage
            .rename(Path::new("/a"), Path::new("/c"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);

        storage.rename(Path::new("/a/b"), Path::new("/b")).await.unwrap();
        storage.rename(Path::new("/a"), Path::new("/c")).await.unwrap();
        assert!(storage.stat(Path::new("/c")).await.unwrap().is_dir);
        assert!(storage.stat(Path::new("/a")).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_all_is_recursive() {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/a/b/c")).await.unwrap();
        storage.write_file(Path::new("/a/b/f"), b"x").await.unwrap();
        storage.write_file(Path::new("/ab"), b"y").await.unwrap();

        storage.remove_all(Path::new("/a")).await.unwrap();
        assert_eq!(
            storage.stat(Path::new("/a/b/f")).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        // Sibling sharing a name prefix survives.
        assert!(storage.stat(Path::new("/ab")).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_dir_lists_direct_children() {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/z/deep")).await.unwrap();
        storage.write_file(Path::new("/b.txt"), b"").await.unwrap();
        storage.write_file(Path::new("/a.txt"), b"").await.unwrap();

        let names: Vec<_> = storage
            .read_dir(Path::new("/"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "z"]);
    }
}
