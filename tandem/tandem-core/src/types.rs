//! Core types shared by endpoints and the diff engine.

use crate::traits::PathSyncSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// Timestamp layout used when rendering change events.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A file or directory at a canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Canonical path, unique within a root
    pub path: String,

    /// Type of node
    pub node_type: NodeType,

    /// Stable identifier: content hash for leaves, persisted UUID for collections
    pub identifier: String,

    /// Content hash (leaves only)
    pub content_signature: Option<String>,

    /// Last modification time, when a stat was performed
    pub mtime: Option<DateTime<Utc>>,

    /// Size in bytes, when a stat was performed
    pub size: Option<u64>,

    /// Unix-style mode bits, when a stat was performed
    pub mode: Option<u32>,
}

impl Node {
    /// Create a leaf whose identity is its content hash.
    pub fn leaf(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        let hash = content_hash.into();
        Self {
            path: path.into(),
            node_type: NodeType::Leaf,
            identifier: hash.clone(),
            content_signature: Some(hash),
            mtime: None,
            size: None,
            mode: None,
        }
    }

    /// Create a collection with the given persisted identifier.
    ///
    /// An empty identifier asks the endpoint to leave the marker alone and
    /// generate one lazily on first load.
    pub fn collection(path: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            node_type: NodeType::Collection,
            identifier: identifier.into(),
            content_signature: None,
            mtime: None,
            size: None,
            mode: None,
        }
    }

    /// Attach stat metadata.
    pub fn with_metadata(mut self, size: u64, mtime: Option<DateTime<Utc>>, mode: u32) -> Self {
        self.size = Some(size);
        self.mtime = mtime;
        self.mode = Some(mode);
        self
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.node_type, NodeType::Leaf)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.node_type, NodeType::Collection)
    }
}

/// Type of node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Leaf,
    Collection,
}

/// Kind of detected change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Write,
    Rename,
    Remove,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Rename => "rename",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// One detected filesystem change.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    /// Detection time
    pub time: DateTime<Utc>,

    /// Canonical path of the changed node
    pub path: String,

    /// Kind of change
    #[serde(rename = "type")]
    pub change_type: ChangeType,

    /// Size of the target, absent for removals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Whether the target is a directory, absent for removals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_folder: Option<bool>,

    /// Endpoint that produced the event
    #[serde(skip)]
    pub source: Option<SourceRef>,
}

impl ChangeEvent {
    /// Event on a target that still exists.
    pub fn present(change_type: ChangeType, path: impl Into<String>, size: u64, is_folder: bool) -> Self {
        Self {
            time: Utc::now(),
            path: path.into(),
            change_type,
            size: Some(size),
            is_folder: Some(is_folder),
            source: None,
        }
    }

    /// Removal event; carries no size or folder data.
    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            path: path.into(),
            change_type: ChangeType::Remove,
            size: None,
            is_folder: None,
            source: None,
        }
    }

    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = Some(source);
        self
    }

    /// Detection time rendered as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
    pub fn timestamp(&self) -> String {
        self.time.format(EVENT_TIME_FORMAT).to_string()
    }
}

/// Non-owning back-reference from an event to the endpoint that emitted it.
#[derive(Clone)]
pub struct SourceRef {
    endpoint: Weak<dyn PathSyncSource>,
}

impl SourceRef {
    pub fn new(endpoint: Weak<dyn PathSyncSource>) -> Self {
        Self { endpoint }
    }

    /// The endpoint, if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn PathSyncSource>> {
        self.endpoint.upgrade()
    }

    /// Whether both references point at the same endpoint.
    pub fn same_endpoint(&self, other: &SourceRef) -> bool {
        Weak::ptr_eq(&self.endpoint, &other.endpoint)
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRef")
            .field("alive", &(self.endpoint.strong_count() > 0))
            .finish()
    }
}

/// Static capabilities an endpoint advertises to the diff engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Folder moves are reported as remove + create, so folders must be rescanned
    pub requires_folders_rescan: bool,

    /// Paths reported by this endpoint go through Unicode normalization
    pub requires_normalization: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_identity_is_content_hash() {
        let node = Node::leaf("/docs/readme.txt", "abc123");
        assert!(node.is_leaf());
        assert_eq!(node.identifier, "abc123");
        assert_eq!(node.content_signature.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_collection_has_no_signature() {
        let node = Node::collection("/docs", "uuid-1");
        assert!(node.is_collection());
        assert!(node.content_signature.is_none());
        assert!(node.size.is_none());
    }

    #[test]
    fn test_removed_event_has_no_stat_data() {
        let event = ChangeEvent::removed("/docs/readme.txt");
        assert_eq!(event.change_type, ChangeType::Remove);
        assert!(event.size.is_none());
        assert!(event.is_folder.is_none());
    }

    #[test]
    fn test_event_serialization_skips_absent_fields() {
        let event = ChangeEvent::removed("/a");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "remove");
        assert!(json.get("size").is_none());
        assert!(json.get("is_folder").is_none());

        let event = ChangeEvent::present(ChangeType::Create, "/b", 2, false);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["size"], 2);
        assert_eq!(json["is_folder"], false);
    }

    #[test]
    fn test_timestamp_format() {
        let mut event = ChangeEvent::removed("/a");
        event.time = DateTime::parse_from_rfc3339("2024-03-01T10:20:30.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(event.timestamp(), "2024-03-01T10:20:30.123Z");
    }
}
