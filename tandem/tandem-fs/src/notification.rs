//! OS notification source.
//!
//! Wraps a recursive `notify` watcher and reduces its events to
//! [`RawEvent`]s: one native path plus a [`RawMask`]. The watcher thread
//! pushes into the growable buffer and never waits on translation.

use bitflags::bitflags;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, trace};

bitflags! {
    /// Kinds of raw notification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RawMask: u8 {
        const CREATE = 1 << 0;
        const WRITE  = 1 << 1;
        const RENAME = 1 << 2;
        const REMOVE = 1 << 3;
        /// Access and unclassified events, never translated
        const OTHER  = 1 << 4;
    }
}

/// One platform notification on one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Absolute native path, as reported by the OS
    pub path: PathBuf,
    pub mask: RawMask,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, mask: RawMask) -> Self {
        Self {
            path: path.into(),
            mask,
        }
    }
}

/// What travels through the buffer: an event, or a failure of the source.
pub type RawNotification = Result<RawEvent, notify::Error>;

/// Mask for a `notify` event kind.
pub fn mask_of(kind: &EventKind) -> RawMask {
    match kind {
        EventKind::Create(_) => RawMask::CREATE,
        EventKind::Modify(ModifyKind::Name(_)) => RawMask::RENAME,
        EventKind::Modify(_) => RawMask::WRITE,
        EventKind::Remove(_) => RawMask::REMOVE,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => RawMask::OTHER,
    }
}

/// Split a `notify` event into one raw event per path.
///
/// A rename carrying both ends yields two rename events; the translator tells
/// them apart by whether each path still exists.
pub fn from_notify(event: Event) -> Vec<RawEvent> {
    let mask = mask_of(&event.kind);
    event
        .paths
        .into_iter()
        .map(|path| RawEvent { path, mask })
        .collect()
}

/// Live registration with the OS.
///
/// Dropping the subscription unregisters it and releases the buffer input
/// held by the watcher callback.
pub struct Subscription {
    watcher: RecommendedWatcher,
    path: PathBuf,
}

impl Subscription {
    /// Register `path` recursively, pushing every notification into `input`.
    pub fn register(path: &Path, input: mpsc::Sender<RawNotification>) -> notify::Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                trace!("Raw notification {:?} on {:?}", event.kind, event.paths);
                for raw in from_notify(event) {
                    // Closed input means the session is draining.
                    if input.blocking_send(Ok(raw)).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                let _ = input.blocking_send(Err(err));
            }
        })?;

        watcher.watch(path, RecursiveMode::Recursive)?;
        debug!("Registered notifications on {}", path.display());

        Ok(Self {
            watcher,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unregister and drop the watcher.
    pub fn unregister(mut self) {
        if let Err(err) = self.watcher.unwatch(&self.path) {
            debug!("Unwatch of {} failed: {}", self.path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};

    #[test]
    fn test_mask_of() {
        assert_eq!(mask_of(&EventKind::Create(CreateKind::File)), RawMask::CREATE);
        assert_eq!(
            mask_of(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            RawMask::WRITE
        );
        assert_eq!(
            mask_of(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            RawMask::RENAME
        );
        assert_eq!(mask_of(&EventKind::Remove(RemoveKind::Folder)), RawMask::REMOVE);
        assert_eq!(mask_of(&EventKind::Access(AccessKind::Any)), RawMask::OTHER);
    }

    #[test]
    fn test_rename_both_splits_per_path() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/root/a"))
            .add_path(PathBuf::from("/root/b"));

        let raw = from_notify(event);
        assert_eq!(
            raw,
            vec![
                RawEvent::new("/root/a", RawMask::RENAME),
                RawEvent::new("/root/b", RawMask::RENAME),
            ]
        );
    }
}
