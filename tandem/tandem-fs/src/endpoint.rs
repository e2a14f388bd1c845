//! The local filesystem endpoint.

use crate::filter::IgnoreList;
use crate::identity;
use crate::path;
use crate::storage::{FsMetadata, OsStorage, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::cmp::Reverse;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tandem_core::config::WatchConfig;
use tandem_core::{
    DataSyncSource, DataSyncTarget, EndpointInfo, Node, NodeReader, NodeWriter, PathSyncSource,
    PathSyncTarget, Result, SourceRef, TandemError, WalkVisitor, WatchSession,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// A directory tree exposed as a synchronization endpoint.
///
/// All paths taken and returned are canonical. The endpoint is always handed
/// out as an `Arc` so that emitted events can point back at it weakly.
pub struct FsEndpoint {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) root: PathBuf,
    pub(crate) ignore: IgnoreList,
    pub(crate) watch_config: WatchConfig,
    /// Sub-paths with a live watch session
    pub(crate) active: Arc<DashSet<String>>,
    self_ref: Weak<FsEndpoint>,
}

impl std::fmt::Debug for FsEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsEndpoint")
            .field("root", &self.root)
            .field("storage", &self.storage)
            .field("active_watches", &self.active.len())
            .finish()
    }
}

impl FsEndpoint {
    /// Open an endpoint on a directory of the local disk.
    pub async fn open(root: impl AsRef<Path>, config: &WatchConfig) -> Result<Arc<Self>> {
        let resolved = path::resolve_root(root.as_ref());
        let storage = OsStorage::new(resolved.clone());
        Self::with_storage(Arc::new(storage), resolved, config).await
    }

    /// Build an endpoint over any storage backend.
    ///
    /// Fails with [`TandemError::Unreachable`] when the storage root cannot be
    /// stat'ed or is not a directory.
    pub async fn with_storage(
        storage: Arc<dyn Storage>,
        root: impl Into<PathBuf>,
        config: &WatchConfig,
    ) -> Result<Arc<Self>> {
        let root = root.into();
        match storage.stat(Path::new(path::ROOT)).await {
            Ok(md) if md.is_dir => {}
            Ok(_) => {
                return Err(TandemError::Unreachable {
                    root,
                    source: std::io::Error::new(ErrorKind::NotADirectory, "root is not a directory"),
                });
            }
            Err(source) => return Err(TandemError::Unreachable { root, source }),
        }

        let ignore = IgnoreList::new(&config.ignore_patterns)?;
        info!("Opened endpoint on {} ({:?})", root.display(), storage.capabilities());

        Ok(Arc::new_cyclic(|self_ref| Self {
            storage,
            root,
            ignore,
            watch_config: config.clone(),
            active: Arc::new(DashSet::new()),
            self_ref: self_ref.clone(),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Weak reference stamped on every event this endpoint emits.
    pub fn source_ref(&self) -> SourceRef {
        let weak: Weak<dyn PathSyncSource> = self.self_ref.clone();
        SourceRef::new(weak)
    }

    /// Whole content of a leaf.
    pub async fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.get_reader_on(path).await?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| TandemError::storage(path, e))?;
        Ok(buf)
    }

    /// Replace the content of a leaf, creating it if needed.
    pub async fn write_all(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut writer = self.get_writer_on(path).await?;
        writer
            .write_all(contents)
            .await
            .map_err(|e| TandemError::storage(path, e))?;
        writer.shutdown().await.map_err(|e| TandemError::storage(path, e))
    }

    async fn stat(&self, canonical: &str) -> Result<FsMetadata> {
        self.storage
            .stat(&path::native_path(canonical))
            .await
            .map_err(|e| TandemError::storage(canonical, e))
    }

    /// Resolve identity for a path whose leaf-ness is known.
    async fn identify(&self, canonical: &str, is_leaf: bool) -> Result<Node> {
        let native = path::native_path(canonical);
        if is_leaf {
            let hash = identity::content_hash(self.storage.as_ref(), &native)
                .await
                .map_err(|e| TandemError::storage(canonical, e))?;
            Ok(Node::leaf(canonical, hash))
        } else {
            let id = identity::folder_id(self.storage.as_ref(), &native)
                .await
                .map_err(|e| TandemError::storage(canonical, e))?;
            Ok(Node::collection(canonical, id))
        }
    }

    /// Visit `start` and everything below it, parents before children,
    /// siblings in name order. An entry that cannot be stat'ed is reported on
    /// its own path; its siblings are still visited.
    async fn walk_tree(&self, visit: &mut WalkVisitor<'_>, start: &str) {
        let start = path::clean(start);
        let md = self.stat(&start).await;

        let mut stack = vec![(start, md)];
        while let Some((current, md)) = stack.pop() {
            let md = match md {
                Ok(md) => md,
                Err(e) => {
                    visit(&current, Err(e));
                    continue;
                }
            };
            if !path::is_root(&current) {
                let node = self
                    .identify(&current, !md.is_dir)
                    .await
                    .map(|node| with_stat(node, &md));
                visit(&current, node);
            }
            if !md.is_dir {
                continue;
            }

            let entries = match self.storage.read_dir(&path::native_path(&current)).await {
                Ok(entries) => entries,
                Err(e) => {
                    visit(&current, Err(TandemError::storage(current.as_str(), e)));
                    continue;
                }
            };
            for entry in entries.into_iter().rev() {
                let child = path::join(&current, &path::to_canonical(&entry.name));
                let ignored = match &entry.metadata {
                    Ok(md) => self.ignore.is_ignored(&child, md.is_dir),
                    Err(_) => self.ignore.is_ignored_any(&child),
                };
                if ignored {
                    continue;
                }
                let md = entry
                    .metadata
                    .map_err(|e| TandemError::storage(child.as_str(), e));
                stack.push((child, md));
            }
        }
    }

    /// Every path of the subtree at `canonical`, markers included, in
    /// pre-order.
    async fn subtree(&self, canonical: &str) -> Result<Vec<(String, bool)>> {
        let mut entries = Vec::new();
        let mut stack = vec![(canonical.to_string(), true)];
        while let Some((current, is_dir)) = stack.pop() {
            if is_dir {
                let children = self
                    .storage
                    .read_dir(&path::native_path(&current))
                    .await
                    .map_err(|e| TandemError::storage(current.as_str(), e))?;
                // Unreadable entries move as a single entry
                for child in children.into_iter().rev() {
                    let is_dir = child.is_dir();
                    stack.push((path::join(&current, &child.name), is_dir));
                }
            }
            entries.push((current, is_dir));
        }
        Ok(entries)
    }

    /// Move a directory entry by entry, for backends whose rename only
    /// moves a single entry.
    ///
    /// Entries are relocated deepest first, so a directory is only removed
    /// once everything below it has moved. Re-running after a failure picks
    /// up what is left under `from`.
    async fn move_recursively(&self, from: &str, to: &str) -> Result<()> {
        let mut entries = self.subtree(from).await?;
        entries.reverse();
        entries.sort_by_key(|(p, _)| Reverse(path::depth(p)));

        for (current, is_dir) in entries {
            let target = path::rebase(&current, from, to)
                .ok_or_else(|| TandemError::invalid_input(format!("{} is not under {}", current, from)))?;
            let native_target = path::native_path(&target);
            if is_dir {
                self.storage
                    .create_dir_all(&native_target)
                    .await
                    .map_err(|e| TandemError::storage(target.as_str(), e))?;
                self.storage
                    .remove_all(&path::native_path(&current))
                    .await
                    .map_err(|e| TandemError::storage(current.as_str(), e))?;
            } else {
                self.ensure_parent(&target).await?;
                debug!("Moving {} to {}", current, target);
                self.storage
                    .rename(&path::native_path(&current), &native_target)
                    .await
                    .map_err(|e| TandemError::storage(current.as_str(), e))?;
            }
        }
        Ok(())
    }

    async fn ensure_parent(&self, canonical: &str) -> Result<()> {
        if let Some(parent) = path::parent(canonical) {
            self.storage
                .create_dir_all(&path::native_path(&parent))
                .await
                .map_err(|e| TandemError::storage(parent.as_str(), e))?;
        }
        Ok(())
    }
}

fn with_stat(node: Node, md: &FsMetadata) -> Node {
    let mtime = md.modified.map(DateTime::<Utc>::from);
    node.with_metadata(md.len, mtime, md.mode)
}

#[async_trait]
impl PathSyncSource for FsEndpoint {
    fn endpoint_info(&self) -> EndpointInfo {
        EndpointInfo {
            requires_folders_rescan: true,
            requires_normalization: path::requires_normalization(),
        }
    }

    async fn load_node(&self, path: &str, known_leaf: Option<bool>) -> Result<Node> {
        let canonical = path::clean(path);
        match known_leaf {
            Some(is_leaf) => self.identify(&canonical, is_leaf).await,
            None => {
                let md = self.stat(&canonical).await?;
                let node = self.identify(&canonical, !md.is_dir).await?;
                Ok(with_stat(node, &md))
            }
        }
    }

    async fn walk(&self, visit: &mut WalkVisitor<'_>, roots: &[&str]) -> Result<()> {
        if roots.is_empty() {
            self.walk_tree(visit, path::ROOT).await;
        }
        for root in roots {
            self.walk_tree(visit, root).await;
        }
        Ok(())
    }

    async fn watch(&self, sub_path: &str) -> Result<WatchSession> {
        self.start_watch(sub_path).await
    }
}

#[async_trait]
impl PathSyncTarget for FsEndpoint {
    async fn create_node(&self, node: &Node) -> Result<()> {
        if node.is_leaf() {
            return Err(TandemError::invalid_input(format!(
                "{} is a leaf; leaves are written through get_writer_on",
                node.path
            )));
        }

        let canonical = path::clean(&node.path);
        match self.stat(&canonical).await {
            Ok(md) if md.is_dir => Ok(()),
            Ok(_) => Err(TandemError::invalid_input(format!(
                "{} exists and is not a collection",
                canonical
            ))),
            Err(e) if e.is_not_found() => {
                let native = path::native_path(&canonical);
                self.storage
                    .create_dir_all(&native)
                    .await
                    .map_err(|e| TandemError::storage(canonical.as_str(), e))?;
                if !node.identifier.is_empty() {
                    identity::write_marker(self.storage.as_ref(), &native, &node.identifier)
                        .await
                        .map_err(|e| TandemError::storage(canonical.as_str(), e))?;
                }
                debug!("Created collection {}", canonical);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update_node(&self, node: &Node) -> Result<()> {
        self.create_node(node).await
    }

    async fn delete_node(&self, path: &str) -> Result<()> {
        let canonical = path::clean(path);
        if path::is_root(&canonical) {
            return Err(TandemError::invalid_input("cannot delete the endpoint root"));
        }
        match self.storage.remove_all(&path::native_path(&canonical)).await {
            Ok(()) => {
                debug!("Deleted {}", canonical);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TandemError::storage(canonical, e)),
        }
    }

    async fn move_node(&self, old_path: &str, new_path: &str) -> Result<()> {
        let from = path::clean(old_path);
        let to = path::clean(new_path);
        if path::is_root(&from) || path::is_root(&to) {
            return Err(TandemError::invalid_input("cannot move the endpoint root"));
        }
        if from == to {
            return Ok(());
        }
        if path::starts_with(&to, &from) {
            return Err(TandemError::invalid_input(format!("cannot move {} into itself", from)));
        }

        let md = match self.stat(&from).await {
            Ok(md) => md,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        self.ensure_parent(&to).await?;

        if md.is_dir && !self.storage.capabilities().atomic_rename {
            debug!("Moving {} to {} entry by entry", from, to);
            return self.move_recursively(&from, &to).await;
        }
        self.storage
            .rename(&path::native_path(&from), &path::native_path(&to))
            .await
            .map_err(|e| TandemError::storage(from, e))
    }
}

#[async_trait]
impl DataSyncSource for FsEndpoint {
    async fn get_reader_on(&self, path: &str) -> Result<NodeReader> {
        let canonical = path::clean(path);
        self.storage
            .open_read(&path::native_path(&canonical))
            .await
            .map_err(|e| TandemError::storage(canonical, e))
    }
}

#[async_trait]
impl DataSyncTarget for FsEndpoint {
    async fn get_writer_on(&self, path: &str) -> Result<NodeWriter> {
        let canonical = path::clean(path);
        let native = path::native_path(&canonical);
        let opened = match self.stat(&canonical).await {
            Ok(md) if md.is_dir => {
                return Err(TandemError::invalid_input(format!(
                    "{} is a collection",
                    canonical
                )));
            }
            Ok(_) => self.storage.open_write(&native).await,
            Err(e) if e.is_not_found() => self.storage.create(&native).await,
            Err(e) => return Err(e),
        };
        opened.map_err(|e| TandemError::storage(canonical, e))
    }
}
