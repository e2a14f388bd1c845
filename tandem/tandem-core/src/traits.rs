//! Traits a synchronization endpoint implements.
//!
//! The diff engine only ever talks to endpoints through these four seams:
//! enumerating and watching paths, mutating the tree, and streaming content in
//! and out.

use crate::error::Result;
use crate::types::{EndpointInfo, Node};
use crate::watch::WatchSession;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read stream on a leaf. Dropping it releases the underlying resource.
pub type NodeReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write stream on a leaf. Dropping it releases the underlying resource.
pub type NodeWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Callback receiving each walked path with its resolved node or the error
/// that prevented resolving it.
pub type WalkVisitor<'a> = dyn FnMut(&str, Result<Node>) + Send + 'a;

/// Endpoint whose tree can be enumerated and observed.
#[async_trait]
pub trait PathSyncSource: Send + Sync {
    /// Static capabilities of this endpoint
    fn endpoint_info(&self) -> EndpointInfo;

    /// Resolve the node at `path`.
    ///
    /// `known_leaf` skips the stat call when the caller already knows whether
    /// the path is a file; stat metadata is then left empty.
    async fn load_node(&self, path: &str, known_leaf: Option<bool>) -> Result<Node>;

    /// Pre-order traversal of `roots`, or of the whole endpoint when empty.
    ///
    /// Failures on one path are reported to `visit` and the traversal moves on.
    async fn walk(&self, visit: &mut WalkVisitor<'_>, roots: &[&str]) -> Result<()>;

    /// Subscribe to changes under `sub_path`.
    async fn watch(&self, sub_path: &str) -> Result<WatchSession>;
}

/// Endpoint whose tree can be mutated.
#[async_trait]
pub trait PathSyncTarget: Send + Sync {
    /// Create a collection (leaves are written through [`DataSyncTarget`])
    async fn create_node(&self, node: &Node) -> Result<()>;

    /// Ensure a collection exists
    async fn update_node(&self, node: &Node) -> Result<()>;

    /// Recursively delete a node; deleting a missing node succeeds
    async fn delete_node(&self, path: &str) -> Result<()>;

    /// Move a node and its whole subtree
    async fn move_node(&self, old_path: &str, new_path: &str) -> Result<()>;
}

/// Endpoint serving leaf content.
#[async_trait]
pub trait DataSyncSource: Send + Sync {
    async fn get_reader_on(&self, path: &str) -> Result<NodeReader>;
}

/// Endpoint accepting leaf content.
#[async_trait]
pub trait DataSyncTarget: Send + Sync {
    /// Open `path` for writing, creating it if it does not exist
    async fn get_writer_on(&self, path: &str) -> Result<NodeWriter>;
}
