//! Local filesystem endpoint for Tandem.
//!
//! [`FsEndpoint`] exposes a directory tree to the diff engine through the
//! `tandem-core` endpoint traits: nodes are loaded, created, moved and
//! deleted through a [`Storage`] backend, and changes are observed through a
//! [`WatchSession`](tandem_core::WatchSession).
//!
//! The watch pipeline is:
//!
//! ```text
//! OS notifications -> growable buffer -> translator -> session channels
//! ```
//!
//! The buffer absorbs bursts so the OS source never has to drop anything,
//! and the translator confirms each notification with a stat before turning
//! it into a [`ChangeEvent`](tandem_core::ChangeEvent).

pub mod buffer;
pub mod endpoint;
pub mod filter;
pub mod identity;
pub mod notification;
pub mod path;
pub mod storage;
pub mod translate;
mod watcher;

pub use endpoint::FsEndpoint;
pub use filter::IgnoreList;
pub use notification::{RawEvent, RawMask};
pub use storage::{MemoryStorage, OsStorage, Storage, StorageCapabilities};
pub use translate::Translator;
